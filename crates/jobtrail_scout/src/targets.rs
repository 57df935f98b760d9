//! Target list loading.
//!
//! The target file is a two-column CSV: site/company name, careers URL.
//! A header row is optional and auto-detected; rows with fewer than two
//! non-empty cells are skipped.

use std::path::Path;

use anyhow::{Context, Result};

/// One configured careers-page target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyTarget {
    pub company: String,
    pub url: String,
}

const COMPANY_ALIASES: &[&str] = &["company", "company_name", "name"];
const URL_ALIASES: &[&str] = &["url", "link"];

pub fn load_company_targets(csv_path: impl AsRef<Path>) -> Result<Vec<CompanyTarget>> {
    let csv_path = csv_path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("failed to read target CSV: {}", csv_path.display()))?;

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed CSV: {}", csv_path.display()))?;
        let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push(cells);
        }
    }

    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let data_rows = if looks_like_header(first) {
        &rows[1..]
    } else {
        &rows[..]
    };

    let mut targets = Vec::new();
    for row in data_rows {
        if row.len() < 2 {
            continue;
        }
        let company = row[0].clone();
        let url = row[1].clone();
        if company.is_empty() || url.is_empty() {
            continue;
        }
        targets.push(CompanyTarget { company, url });
    }

    Ok(targets)
}

fn looks_like_header(cells: &[String]) -> bool {
    if cells.len() < 2 {
        return false;
    }
    let c0 = cells[0].to_lowercase();
    let c1 = cells[1].to_lowercase();
    (COMPANY_ALIASES.contains(&c0.as_str()) && URL_ALIASES.contains(&c1.as_str()))
        || (c0.contains("company") && c1.contains("url"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_headerless_csv() {
        let file = write_csv("NVIDIA,https://nvidia.example/careers\nAcme,https://acme.example/jobs\n");
        let targets = load_company_targets(file.path()).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].company, "NVIDIA");
        assert_eq!(targets[1].url, "https://acme.example/jobs");
    }

    #[test]
    fn detects_and_skips_header_row() {
        for header in ["company,url", "Company,URL", "name,link", "company_name,url"] {
            let file = write_csv(&format!("{header}\nAcme,https://acme.example\n"));
            let targets = load_company_targets(file.path()).unwrap();
            assert_eq!(targets.len(), 1, "header {header:?} not detected");
            assert_eq!(targets[0].company, "Acme");
        }
    }

    #[test]
    fn fuzzy_header_detection() {
        let file = write_csv("Company Name,Careers URL\nAcme,https://acme.example\n");
        let targets = load_company_targets(file.path()).unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn skips_blank_and_short_rows() {
        let file = write_csv("Acme,https://acme.example\n,\n\nLonely\nBeta,https://beta.example\n");
        let targets = load_company_targets(file.path()).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].company, "Beta");
    }

    #[test]
    fn empty_file_yields_no_targets() {
        let file = write_csv("");
        assert!(load_company_targets(file.path()).unwrap().is_empty());
    }

    #[test]
    fn cells_are_trimmed() {
        let file = write_csv(" Acme , https://acme.example \n");
        let targets = load_company_targets(file.path()).unwrap();
        assert_eq!(targets[0].company, "Acme");
        assert_eq!(targets[0].url, "https://acme.example");
    }
}
