// ==============================================================================
// csv.rs - Orderform Sheet Parser
// ==============================================================================
// Description: Reads CSV exports of the orderform sheet, mapping LIMS column
//              names onto order samples
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use ::csv::ReaderBuilder;
use tracing::{debug, info};

use super::{Order, OrderError, OrderSample};
use crate::constants::SOURCE_TYPES;

const TABLE_HEADER_START: &str = "<TABLE HEADER>";
const TABLE_HEADER_END: &str = "</TABLE HEADER>";
const SAMPLES_START: &str = "<SAMPLE ENTRIES>";
const SAMPLES_END: &str = "</SAMPLE ENTRIES>";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Header,
    Samples,
    Done,
}

/// One raw sample row keyed by LIMS column name
type RawSample = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct CsvOrderformParser {
    pub order_name: Option<String>,
    pub customer_id: Option<String>,
}

impl CsvOrderformParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an orderform export; the order is named after the file
    pub fn parse_file(&mut self, path: &Path) -> Result<Order, OrderError> {
        let file = std::fs::File::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parse_reader(file, &name)
    }

    pub fn parse_reader<R: Read>(&mut self, reader: R, order_name: &str) -> Result<Order, OrderError> {
        let raw_samples = read_raw_samples(reader)?;
        if raw_samples.is_empty() {
            return Err(OrderError::NoSamples);
        }

        let samples = raw_samples
            .iter()
            .map(sample_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut customers: Vec<&str> = raw_samples
            .iter()
            .filter_map(|row| field(row, "UDF/customer"))
            .collect();
        customers.dedup();
        let customer = match customers.as_slice() {
            [single] => single.to_string(),
            [] => return Err(OrderError::Malformed("no customer given".to_string())),
            _ => return Err(OrderError::Malformed(format!("samples have different customers: {}", customers.join(", ")))),
        };

        info!("Parsed orderform {} with {} samples for {}", order_name, samples.len(), customer);
        self.order_name = Some(order_name.to_string());
        self.customer_id = Some(customer.clone());

        Ok(Order {
            name: order_name.to_string(),
            customer,
            comment: None,
            ticket: None,
            samples,
        })
    }
}

fn read_raw_samples<R: Read>(reader: R) -> Result<Vec<RawSample>, OrderError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut section = Section::Preamble;
    let mut header: Vec<String> = Vec::new();
    let mut samples = Vec::new();

    for result in reader.records() {
        let record = result?;
        let first = record.get(0).unwrap_or("").trim();

        match (section, first) {
            (_, TABLE_HEADER_START) => section = Section::Header,
            (_, TABLE_HEADER_END) => section = Section::Preamble,
            (_, SAMPLES_START) => section = Section::Samples,
            (_, SAMPLES_END) => section = Section::Done,
            (Section::Header, "") => {}
            (Section::Header, _) if header.is_empty() => {
                header = record.iter().map(|h| h.trim().to_string()).collect();
            }
            (Section::Samples, "") => debug!("Skipping empty sample row"),
            (Section::Samples, _) => {
                if header.is_empty() {
                    return Err(OrderError::Malformed("sample entries before table header".to_string()));
                }
                let row: RawSample = header
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.clone(), v.trim().to_string()))
                    .collect();
                samples.push(row);
            }
            _ => {}
        }

        if section == Section::Done {
            break;
        }
    }

    Ok(samples)
}

fn field<'a>(row: &'a RawSample, column: &str) -> Option<&'a str> {
    row.get(column).map(String::as_str).filter(|v| !v.is_empty())
}

fn owned(row: &RawSample, column: &str) -> Option<String> {
    field(row, column).map(str::to_string)
}

fn invalid(sample: &str, field: &'static str, reason: String) -> OrderError {
    OrderError::Invalid {
        sample: sample.to_string(),
        field,
        reason,
    }
}

/// Drop a trailing `.0` and reject anything that is not a number
fn numeric(sample: &str, field: &'static str, value: Option<&str>) -> Result<Option<String>, OrderError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.strip_suffix(".0").unwrap_or(value);
    let digits = trimmed.replace('.', "");
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(Some(trimmed.to_string()))
    } else {
        Err(invalid(sample, field, format!("non numeric value {}", value)))
    }
}

fn data_analysis(value: Option<&str>) -> Option<String> {
    value.map(|v| {
        if v.eq_ignore_ascii_case("no analysis") {
            v.to_string()
        } else {
            v.to_lowercase()
        }
    })
}

fn parent(value: Option<&str>) -> Option<String> {
    value.filter(|v| *v != "0.0").map(str::to_string)
}

fn sex(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    let sex = match value {
        "M" | "male" => "male",
        "F" | "K" | "female" => "female",
        _ => "unknown",
    };
    Some(sex.to_string())
}

fn panels(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let separator = if value.contains(':') { ':' } else { ';' };
    value
        .split(separator)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn lowered(value: Option<&str>) -> Option<String> {
    value.map(|v| {
        let lower = v.to_lowercase();
        if lower == "förtur" {
            "priority".to_string()
        } else {
            lower
        }
    })
}

fn flag(value: Option<&str>) -> Option<bool> {
    value.map(|v| matches!(v.trim().to_lowercase().as_str(), "yes" | "true" | "1" | "x"))
}

fn sample_from_row(row: &RawSample) -> Result<OrderSample, OrderError> {
    let name = field(row, "Sample/Name")
        .ok_or_else(|| OrderError::Malformed("sample row without Sample/Name".to_string()))?
        .to_string();

    let source = owned(row, "UDF/Source");
    if let Some(value) = &source {
        if !SOURCE_TYPES.contains(&value.as_str()) {
            return Err(invalid(&name, "source", format!("{} is not a valid source", value)));
        }
    }

    Ok(OrderSample {
        application: owned(row, "UDF/Sequencing Analysis"),
        capture_kit: owned(row, "UDF/Capture Library version"),
        family_name: owned(row, "UDF/familyID"),
        comment: owned(row, "UDF/Comment"),
        concentration: numeric(&name, "concentration", field(row, "UDF/Concentration (nM)"))?,
        concentration_sample: numeric(&name, "concentration_sample", field(row, "UDF/Sample Conc."))?,
        container: owned(row, "Container/Type"),
        container_name: owned(row, "Container/Name"),
        index_sequence: owned(row, "UDF/Custom index"),
        data_analysis: data_analysis(field(row, "UDF/Data Analysis")),
        data_delivery: owned(row, "UDF/Data Delivery").map(|d| d.to_lowercase()),
        elution_buffer: owned(row, "UDF/Sample Buffer"),
        extraction_method: owned(row, "UDF/Extraction method"),
        father: parent(field(row, "UDF/fatherID")),
        mother: parent(field(row, "UDF/motherID")),
        formalin_fixation_time: owned(row, "UDF/Formalin Fixation Time"),
        post_formalin_fixation_time: owned(row, "UDF/Post Formalin Fixation Time"),
        from_sample: owned(row, "UDF/is_for_sample"),
        index: owned(row, "UDF/Index type"),
        index_number: numeric(&name, "index_number", field(row, "UDF/Index number"))?,
        organism: owned(row, "UDF/Strain"),
        organism_other: owned(row, "UDF/Other species"),
        panels: panels(field(row, "UDF/Gene List")),
        pool: owned(row, "UDF/pool name"),
        priority: lowered(field(row, "UDF/priority")),
        quantity: numeric(&name, "quantity", field(row, "UDF/Quantity"))?,
        reference_genome: owned(row, "UDF/Reference Genome Microbial"),
        require_qcok: flag(field(row, "UDF/Process only if QC OK")),
        rml_plate_name: owned(row, "UDF/RML plate name"),
        sex: sex(field(row, "UDF/Gender")),
        source,
        status: lowered(field(row, "UDF/Status")),
        time_point: numeric(&name, "time_point", field(row, "UDF/time_point"))?,
        tissue_block_size: owned(row, "UDF/Tissue Block Size"),
        tumour: flag(field(row, "UDF/tumor")),
        tumour_purity: owned(row, "UDF/tumour purity"),
        volume: numeric(&name, "volume", field(row, "UDF/Volume (uL)"))?,
        well_position: owned(row, "Sample/Well Location"),
        well_position_rml: owned(row, "UDF/RML well position"),
        name,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIP_SHEET: &str = "\
Orderform 1508:22,,,,,,,,,
<TABLE HEADER>,,,,,,,,,
Sample/Name,UDF/customer,UDF/Data Analysis,UDF/Sequencing Analysis,UDF/familyID,UDF/Gender,UDF/Gene List,UDF/motherID,UDF/priority,UDF/Volume (uL)
</TABLE HEADER>,,,,,,,,,
<SAMPLE ENTRIES>,,,,,,,,,
s1,cust000,MIP DNA,WGSPCFC030,c1,M,OMIM-AUTO:PEDHEP,s2,Förtur,1.0
,,,,,,,,,
s2,cust000,MIP DNA,WGSPCFC030,c1,K,OMIM-AUTO,0.0,research,20
</SAMPLE ENTRIES>,,,,,,,,,
ignored,cust999,,,,,,,,
";

    #[test]
    fn test_parse_mip_sheet() {
        let mut parser = CsvOrderformParser::new();
        let order = parser.parse_reader(MIP_SHEET.as_bytes(), "1604-ticket").unwrap();

        assert_eq!(parser.order_name.as_deref(), Some("1604-ticket"));
        assert_eq!(parser.customer_id.as_deref(), Some("cust000"));
        assert_eq!(order.samples.len(), 2);

        let s1 = &order.samples[0];
        assert_eq!(s1.name, "s1");
        assert_eq!(s1.data_analysis.as_deref(), Some("mip dna"));
        assert_eq!(s1.sex.as_deref(), Some("male"));
        assert_eq!(s1.panels, vec!["OMIM-AUTO", "PEDHEP"]);
        assert_eq!(s1.mother.as_deref(), Some("s2"));
        assert_eq!(s1.priority.as_deref(), Some("priority"));
        assert_eq!(s1.volume.as_deref(), Some("1"));

        let s2 = &order.samples[1];
        assert_eq!(s2.sex.as_deref(), Some("female"));
        assert_eq!(s2.mother, None);
        assert_eq!(s2.volume.as_deref(), Some("20"));
    }

    #[test]
    fn test_non_numeric_value_is_rejected() {
        let sheet = MIP_SHEET.replace(",1.0\n", ",lots\n");
        let err = CsvOrderformParser::new()
            .parse_reader(sheet.as_bytes(), "order")
            .unwrap_err();
        assert!(matches!(err, OrderError::Invalid { field: "volume", .. }));
    }

    #[test]
    fn test_no_analysis_keeps_case() {
        assert_eq!(data_analysis(Some("No analysis")).as_deref(), Some("No analysis"));
        assert_eq!(data_analysis(Some("FLUFFY")).as_deref(), Some("fluffy"));
    }

    #[test]
    fn test_panel_separators() {
        assert_eq!(panels(Some("A;B")), vec!["A", "B"]);
        assert_eq!(panels(Some("A:B;C")), vec!["A", "B;C"]);
        assert!(panels(None).is_empty());
    }

    #[test]
    fn test_unknown_source() {
        let mut row = RawSample::new();
        row.insert("Sample/Name".to_string(), "s1".to_string());
        row.insert("UDF/Source".to_string(), "moon rock".to_string());
        let err = sample_from_row(&row).unwrap_err();
        assert!(matches!(err, OrderError::Invalid { field: "source", .. }));
    }

    #[test]
    fn test_sex_mapping() {
        assert_eq!(sex(Some("F")).as_deref(), Some("female"));
        assert_eq!(sex(Some("Unknown")).as_deref(), Some("unknown"));
        assert_eq!(sex(None), None);
    }
}
