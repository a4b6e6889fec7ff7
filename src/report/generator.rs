//! Text, Markdown and JSON report generation.
//!
//! Every format walks the report sections in key order, so output is
//! stable regardless of which plugin finished first.

use crate::models::{AggregateReport, Asset, PluginReport, ALL_KEY};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Facts about the run that produced a report.
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub items: usize,
    pub plugins: Vec<String>,
    pub duration_seconds: f64,
}

/// Generate the plain text summary.
///
/// One block per section: the section name, then per asset its sorted tag
/// names, color keys and face count, then the section's errors.
pub fn generate_text_report(report: &AggregateReport) -> String {
    let mut output = String::new();

    for (name, section) in report.sections() {
        output.push_str(&format!("{}\n", name));

        for asset in &section.assets {
            output.push_str(&format!("Asset: {}\n", asset.name));
            if !asset.tags.is_empty() {
                output.push_str(&format!("Tags: [{}]\n", join_keys(asset.tags.keys())));
            }
            if !asset.colors.is_empty() {
                output.push_str(&format!("Colors: [{}]\n", join_keys(asset.colors.keys())));
            }
            if !asset.faces.is_empty() {
                output.push_str(&format!("Faces: {}\n", asset.faces.len()));
            }
        }

        for error in &section.errors {
            output.push_str(&format!("- {}\n", error));
        }

        output.push('\n');
    }

    output
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(" ")
}

/// Generate a Markdown report.
pub fn generate_markdown_report(report: &AggregateReport, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# Visago Report\n\n");
    output.push_str(&generate_metadata_section(metadata, report));

    output.push_str("## Combined Results\n\n");
    output.push_str(&generate_section_body(&report.all, true));

    for (name, section) in report.sections() {
        if name == ALL_KEY {
            continue;
        }
        output.push_str(&format!("## {}\n\n", name));
        output.push_str(&generate_section_body(section, false));
    }

    output
}

fn generate_metadata_section(metadata: &ReportMetadata, report: &AggregateReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Items:** {}\n", metadata.items));
    section.push_str(&format!("- **Plugins:** {}\n", metadata.plugins.join(", ")));
    if report.error_count() > 0 {
        section.push_str(&format!("- **Errors:** {}\n", report.error_count()));
    }
    section.push_str(&format!("- **Duration:** {:.1}s\n\n", metadata.duration_seconds));

    section
}

fn generate_section_body(section: &PluginReport, with_sources: bool) -> String {
    let mut body = String::new();

    if section.assets.is_empty() && section.errors.is_empty() {
        body.push_str("*No results.*\n\n");
        return body;
    }

    for asset in &section.assets {
        body.push_str(&generate_asset_block(asset, with_sources));
    }

    if !section.errors.is_empty() {
        body.push_str("**Errors:**\n\n");
        for error in &section.errors {
            body.push_str(&format!("- {}\n", error));
        }
        body.push('\n');
    }

    body
}

fn generate_asset_block(asset: &Asset, with_sources: bool) -> String {
    let mut block = String::new();

    block.push_str(&format!("### `{}`\n\n", asset.name));

    if !asset.tags.is_empty() {
        if with_sources {
            block.push_str("| Tag | Score | Source |\n|:---|:---:|:---|\n");
        } else {
            block.push_str("| Tag | Score |\n|:---|:---:|\n");
        }
        for (name, tags) in &asset.tags {
            for tag in tags {
                block.push_str(&format!("| {} | {:.2} |", name, tag.score));
                if with_sources {
                    block.push_str(&format!(" {} |", tag.source.as_deref().unwrap_or("")));
                }
                block.push('\n');
            }
        }
        block.push('\n');
    }

    if !asset.colors.is_empty() {
        block.push_str("**Colors:** ");
        let colors: Vec<String> = asset
            .colors
            .iter()
            .map(|(hex, found)| {
                let fraction = found.iter().map(|c| c.pixel_fraction).fold(0.0, f64::max);
                format!("`{}` ({:.0}%)", hex, fraction * 100.0)
            })
            .collect();
        block.push_str(&colors.join(", "));
        block.push_str("\n\n");
    }

    if !asset.faces.is_empty() {
        block.push_str(&format!("**Faces:** {}\n\n", asset.faces.len()));
    }

    block
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AggregateReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorResult, FaceResult, TagResult};

    fn tagged(name: &str, score: f64, source: Option<&str>) -> TagResult {
        let mut tag = TagResult::new(name, score);
        tag.source = source.map(String::from);
        tag
    }

    fn create_test_report() -> AggregateReport {
        let mut merged = Asset::new("http://x/dog.jpg");
        merged.tags.insert(
            "dog".to_string(),
            vec![
                tagged("dog", 0.97, Some("clarifai")),
                tagged("dog", 0.9, Some("imagga")),
            ],
        );
        merged
            .tags
            .insert("animal".to_string(), vec![tagged("animal", 0.8, Some("imagga"))]);
        let mut color = ColorResult::from_hex("#aabbcc").unwrap();
        color.pixel_fraction = 0.25;
        color.source = Some("imagga".to_string());
        merged.colors.insert("#aabbcc".to_string(), vec![color]);
        merged.faces.push(FaceResult::default());

        let mut imagga = Asset::new("http://x/dog.jpg");
        imagga.tags.insert("dog".to_string(), vec![tagged("dog", 0.9, None)]);

        let mut report = AggregateReport::default();
        report.all.assets.push(merged);
        report.all.errors.push("credentials not found".to_string());
        report.providers.insert(
            "imagga".to_string(),
            PluginReport {
                assets: vec![imagga],
                errors: Vec::new(),
            },
        );
        report.providers.insert(
            "googlevision".to_string(),
            PluginReport {
                assets: Vec::new(),
                errors: vec!["credentials not found".to_string()],
            },
        );
        report
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            generated_at: Utc::now(),
            items: 1,
            plugins: vec!["googlevision".to_string(), "imagga".to_string()],
            duration_seconds: 1.5,
        }
    }

    #[test]
    fn test_generate_text_report() {
        let text = generate_text_report(&create_test_report());

        let expected = "all\n\
            Asset: http://x/dog.jpg\n\
            Tags: [animal dog]\n\
            Colors: [#aabbcc]\n\
            Faces: 1\n\
            - credentials not found\n\
            \n\
            googlevision\n\
            - credentials not found\n\
            \n\
            imagga\n\
            Asset: http://x/dog.jpg\n\
            Tags: [dog]\n\
            \n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report(), &metadata());

        assert!(markdown.contains("# Visago Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Errors:** 1"));
        assert!(markdown.contains("- **Duration:** 1.5s"));
        assert!(markdown.contains("## Combined Results"));
        assert!(markdown.contains("| dog | 0.97 | clarifai |"));
        assert!(markdown.contains("`#aabbcc` (25%)"));
        assert!(markdown.contains("## imagga"));
        assert!(markdown.contains("| dog | 0.90 |\n"));
        assert!(!markdown.contains("## all"));

        let combined = markdown.find("## Combined Results").unwrap();
        let google = markdown.find("## googlevision").unwrap();
        let imagga = markdown.find("## imagga").unwrap();
        assert!(combined < google && google < imagga);
    }

    #[test]
    fn test_empty_section_markdown() {
        let body = generate_section_body(&PluginReport::default(), false);
        assert_eq!(body, "*No results.*\n\n");
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["all"]["errors"][0], "credentials not found");
        assert_eq!(value["all"]["assets"][0]["tags"]["dog"][1]["source"], "imagga");
        assert!(value["imagga"]["errors"].is_null());
        assert!(value["googlevision"]["assets"].is_null());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        write_report("hello\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");

        let err = write_report("x", &dir.path().join("missing/report.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to write report"));
    }
}
