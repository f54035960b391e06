// ==============================================================================
// upload/fixtures.rs - Upload Test Fixtures
// ==============================================================================
// Description: A MIP DNA trio case shared by the upload tests
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::bundle::{build_bundle, MipAnalysis, MipConfig, PeddyFiles, SampleFiles, SampleInfo, VariantFiles};
use crate::models::{Analysis, CaseLink, Family, FamilySample, Sample};

pub fn sample(id: i32, internal_id: &str, name: &str, sex: &str) -> Sample {
    let ordered = Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap();
    Sample {
        id,
        internal_id: internal_id.to_string(),
        name: name.to_string(),
        customer_id: 1,
        application_version_id: 1,
        organism_id: None,
        invoice_id: None,
        sex: sex.to_string(),
        comment: None,
        control: None,
        downsampled_to: None,
        is_tumour: false,
        order: Some("order 1".to_string()),
        priority: 1,
        ticket_number: Some(123456),
        reads: 0,
        ordered_at: ordered,
        received_at: None,
        prepared_at: None,
        sequenced_at: None,
        delivered_at: None,
        invoiced_at: None,
        created_at: ordered,
    }
}

pub fn case() -> Family {
    let ordered = Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap();
    Family {
        id: 1,
        internal_id: "grumpyowl".to_string(),
        name: "family 1".to_string(),
        customer_id: 1,
        data_analysis: "mip-dna".to_string(),
        data_delivery: "scout".to_string(),
        panels: vec!["IEM".to_string()],
        cohorts: vec![],
        priority: 1,
        action: None,
        avatar_url: None,
        synopsis: None,
        ordered_at: ordered,
        created_at: ordered,
    }
}

pub fn trio() -> Vec<CaseLink> {
    let child = sample(1, "ADM1", "child", "male");
    let mother = sample(2, "ADM2", "mother", "female");
    let father = sample(3, "ADM3", "father", "male");

    let link = |id: i32, s: &Sample, status: &str, mother: Option<Sample>, father: Option<Sample>| CaseLink {
        link: FamilySample {
            id,
            family_id: 1,
            sample_id: s.id,
            mother_id: mother.as_ref().map(|m| m.id),
            father_id: father.as_ref().map(|f| f.id),
            status: status.to_string(),
        },
        sample: s.clone(),
        mother,
        father,
    };

    vec![
        link(1, &child, "affected", Some(mother.clone()), Some(father.clone())),
        link(2, &mother, "unaffected", None, None),
        link(3, &father, "unaffected", None, None),
    ]
}

pub fn mip_analysis() -> MipAnalysis {
    let config = MipConfig {
        case: "grumpyowl".to_string(),
        config_path: "/a/grumpyowl_config.yaml".into(),
        sampleinfo_path: "/a/grumpyowl_qc_sample_info.yaml".into(),
        log_path: "/a/mip.log".into(),
        email: None,
    };
    let sample_files = |id: &str| SampleFiles {
        id: id.to_string(),
        sambamba: format!("/a/{}.bed", id).into(),
        bam: format!("/a/{}.bam", id).into(),
        subsample_mt: None,
        vcf2cytosure: format!("/a/{}.cgh", id).into(),
        capture_kit: Some("agilent_sureselect_cre.v1".to_string()),
    };
    let sampleinfo = SampleInfo {
        date: NaiveDateTime::parse_from_str("2026-10-01T08:00:00", "%Y-%m-%dT%H:%M:%S").unwrap(),
        version: "v9.1.3".to_string(),
        pedigree_path: "/a/pedigree.yaml".into(),
        qcmetrics_path: "/a/metrics_deliverables.yaml".into(),
        snv: VariantFiles {
            bcf: "/a/snv.bcf".into(),
            clinical_vcf: Some("/a/snv_clinical.vcf.gz".into()),
            research_vcf: Some("/a/snv_research.vcf.gz".into()),
        },
        sv: VariantFiles {
            bcf: "/a/sv.bcf".into(),
            clinical_vcf: Some("/a/sv_clinical.vcf.gz".into()),
            research_vcf: None,
        },
        peddy: PeddyFiles {
            ped_check: "/a/peddy.ped_check.csv".into(),
            ped: "/a/peddy.peddy.ped".into(),
            sex_check: "/a/peddy.sex_check.csv".into(),
        },
        str_vcf: None,
        samples: ["ADM1", "ADM2", "ADM3"].iter().map(|id| sample_files(id)).collect(),
        genome_build: None,
        rank_model_version: Some("1.28".to_string()),
        sv_rank_model_version: None,
    };
    let bundle = build_bundle(&config, &sampleinfo);
    MipAnalysis { config, sampleinfo, bundle }
}

/// Completed analysis row of the trio case
pub fn analysis_row(id: i32) -> Analysis {
    let started = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
    Analysis {
        id,
        family_id: 1,
        pipeline: "mip-dna".to_string(),
        pipeline_version: Some("v9.1.3".to_string()),
        started_at: Some(started),
        completed_at: Some(started + chrono::Duration::hours(20)),
        upload_started_at: None,
        uploaded_at: None,
        delivered_at: None,
        delivery_report_created_at: None,
        is_primary: true,
        created_at: started,
    }
}
