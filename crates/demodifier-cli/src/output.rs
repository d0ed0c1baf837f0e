use std::path::PathBuf;

use demodifier_core::{IdenticalLcas, Lca, PositionCheck};
use serde::Serialize;

use crate::runner::RowResult;
use crate::Runner;

#[derive(Serialize)]
struct Permutation<'a> {
    variant: &'a str,
    lca: &'a Lca,
}

#[derive(Serialize)]
struct Summary<'a> {
    total_permutations: usize,
    matched_permutations: usize,
    #[serde(rename = "unique_LCAs")]
    unique_lcas: Vec<&'a str>,
    #[serde(rename = "identical_LCAs")]
    identical_lcas: bool,
    deamidation_position_checking: PositionCheck,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    sequence: &'a str,
    modifications: &'a str,
    #[serde(rename = "input_pep_LCA")]
    input_lca: &'a Lca,
    permutations: Vec<Permutation<'a>>,
    summary: Summary<'a>,
}

impl<'a> From<&'a RowResult> for JsonRecord<'a> {
    fn from(result: &'a RowResult) -> Self {
        let c = &result.classification;
        JsonRecord {
            sequence: &result.row.sequence,
            modifications: &result.row.modifications,
            input_lca: &result.input_lca,
            permutations: result
                .pairs()
                .map(|(variant, lca)| Permutation { variant, lca })
                .collect(),
            summary: Summary {
                total_permutations: c.total,
                matched_permutations: c.matched_variants.len(),
                unique_lcas: c.distinct_labels.iter().map(String::as_str).collect(),
                identical_lcas: c.identical_lcas == IdenticalLcas::Yes,
                deamidation_position_checking: c.position_checking,
            },
        }
    }
}

impl Runner {
    /// `<input stem>_<suffix>` inside the output directory
    fn make_path(&self, suffix: &str) -> PathBuf {
        let stem = self
            .parameters
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "demodifier".into());
        self.parameters
            .output_directory
            .join(format!("{}_{}", stem, suffix))
    }

    pub fn serialize_summary(&self, result: &RowResult) -> csv::ByteRecord {
        let c = &result.classification;
        let mut record = csv::ByteRecord::new();
        record.push_field(result.row.sequence.as_bytes());
        record.push_field(result.row.modifications.as_bytes());
        record.push_field(result.input_lca.to_string().as_bytes());
        record.push_field(itoa::Buffer::new().format(c.total).as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(c.matched_variants.len())
                .as_bytes(),
        );
        record.push_field(c.matched_variants.join(";").as_bytes());
        record.push_field(c.matched_labels.join(";").as_bytes());
        record.push_field(c.identical_lcas.to_string().as_bytes());
        record.push_field(c.position_checking.to_string().as_bytes());
        record
    }

    pub fn write_summary(&self, results: &[RowResult]) -> anyhow::Result<String> {
        let path = self.make_path("results.csv");

        let mut wtr = csv::WriterBuilder::new().from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "Sequence",
            "Modifications",
            "input_pep_LCA",
            "total_unique_permutations_(count)",
            "all_permutations_with_LCAs_(count)",
            "permutations_yielding_LCAs",
            "all_permutation_LCAs",
            "identical_LCAs",
            "deamidation_position_checking",
        ]);

        wtr.write_byte_record(&headers)?;
        for result in results {
            wtr.write_byte_record(&self.serialize_summary(result))?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn write_permutations(&self, results: &[RowResult]) -> anyhow::Result<String> {
        let path = self.make_path("permutations.csv");

        let mut wtr = csv::WriterBuilder::new().from_writer(vec![]);
        wtr.write_byte_record(&csv::ByteRecord::from(vec![
            "Sequence",
            "Modifications",
            "Variant",
            "Variant_LCA",
        ]))?;

        for result in results {
            for (variant, lca) in result.pairs() {
                let mut record = csv::ByteRecord::new();
                record.push_field(result.row.sequence.as_bytes());
                record.push_field(result.row.modifications.as_bytes());
                record.push_field(variant.as_bytes());
                record.push_field(lca.to_string().as_bytes());
                wtr.write_byte_record(&record)?;
            }
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    pub fn write_json(&self, results: &[RowResult]) -> anyhow::Result<String> {
        let path = self.make_path("output.json");
        let records = results.iter().map(JsonRecord::from).collect::<Vec<_>>();
        let bytes = serde_json::to_vec_pretty(&records)?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }

    /// Record the settings a run was made with
    pub fn write_parameters(&self) -> anyhow::Result<String> {
        let path = self.make_path("parameters.json");
        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}
