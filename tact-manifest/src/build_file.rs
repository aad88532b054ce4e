//! Build descriptor parsing and active-row selection.
//!
//! A storage directory carries one of three top-level descriptors:
//! `.build.info` (current local storages), `.build.db` (older storages) or
//! `versions` (cached online storages). Whichever is present, the outcome is
//! the same: the digests of the CDN config and CDN build documents for the
//! selected build, plus the default locale and the build number.

use crate::bpsv::BpsvDocument;
use crate::config::parser::parse_md5_string;
use crate::{Error, Md5, Result};
use tracing::debug;

/// Which descriptor file the storage carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDescriptorKind {
    /// `.build.info`
    BuildInfo,
    /// `.build.db`
    BuildDb,
    /// `versions`
    Versions,
}

/// Selection filters for the active descriptor row.
#[derive(Debug, Default, Clone)]
pub struct RowSelector<'a> {
    /// Region / branch name ("us", "eu", ...).
    pub region: Option<&'a str>,
    /// Hex prefix of the wanted CDN build key.
    pub build_key: Option<&'a str>,
}

/// The resolved build descriptor row.
#[derive(Debug, Clone, Default)]
pub struct BuildDescriptor {
    /// Digest of the CDN build document. Always present.
    pub cdn_build_key: Option<Md5>,
    /// Digest of the CDN config document.
    pub cdn_config_key: Option<Md5>,
    /// Build number, from the `BuildId` column or the version string.
    pub build_number: Option<u32>,
    /// Locale mask derived from the `Tags` column.
    pub default_locale: u32,
    /// Product code, where the descriptor carries one.
    pub product: Option<String>,
    /// Version display name.
    pub version_name: Option<String>,
}

/// Locale bit for a tag name, if the tag names a locale.
///
/// The bit assignments follow the storage's locale mask convention.
pub fn locale_bit(tag: &str) -> Option<u32> {
    Some(match tag {
        "enUS" => 0x0000_0002,
        "koKR" => 0x0000_0004,
        "frFR" => 0x0000_0010,
        "deDE" => 0x0000_0020,
        "zhCN" => 0x0000_0040,
        "esES" => 0x0000_0080,
        "zhTW" => 0x0000_0100,
        "enGB" => 0x0000_0200,
        "esMX" => 0x0000_1000,
        "ruRU" => 0x0000_2000,
        "ptBR" => 0x0000_4000,
        "itIT" => 0x0000_8000,
        "ptPT" => 0x0001_0000,
        _ => return None,
    })
}

fn locale_mask_from_tags(tags: &str) -> u32 {
    tags.split_ascii_whitespace()
        .filter_map(locale_bit)
        .fold(0, |acc, bit| acc | bit)
}

/// Build number from a version string such as `9.2.7.45114`: the last dotted
/// component that parses as an integer.
fn build_number_from_version(version: &str) -> Option<u32> {
    version.rsplit('.').find_map(|part| part.parse().ok())
}

impl BuildDescriptor {
    /// Parse a descriptor document and select the active row.
    pub fn parse(kind: BuildDescriptorKind, text: &str, selector: &RowSelector) -> Result<Self> {
        match kind {
            BuildDescriptorKind::BuildInfo => Self::parse_build_info(text, selector),
            BuildDescriptorKind::Versions => Self::parse_versions(text, selector),
            BuildDescriptorKind::BuildDb => Self::parse_build_db(text),
        }
    }

    fn parse_build_info(text: &str, selector: &RowSelector) -> Result<Self> {
        let doc = BpsvDocument::parse(text)?;

        let row = Self::select_row(&doc, selector, "Branch", "Build Key")?;

        let mut out = BuildDescriptor {
            cdn_build_key: Self::md5_field(&doc, row, "Build Key")?,
            cdn_config_key: Self::md5_field(&doc, row, "CDN Key")?,
            ..Default::default()
        };
        if let Some(tags) = doc.value(row, "Tags") {
            out.default_locale = locale_mask_from_tags(tags);
        }
        if let Some(version) = doc.value(row, "Version") {
            out.build_number = build_number_from_version(version);
            out.version_name = Some(version.to_string());
        }
        out.product = doc.value(row, "Product").map(str::to_string);

        debug!(
            "Selected .build.info row: build={:?} cdn={:?} locale={:#x}",
            out.cdn_build_key.map(hex::encode),
            out.cdn_config_key.map(hex::encode),
            out.default_locale
        );
        Ok(out)
    }

    fn parse_versions(text: &str, selector: &RowSelector) -> Result<Self> {
        let doc = BpsvDocument::parse(text)?;

        // "versions" rows are keyed by region; default to "us" when the
        // caller does not care.
        let region_selector = RowSelector {
            region: Some(selector.region.unwrap_or("us")),
            build_key: selector.build_key,
        };
        let row = Self::select_row(&doc, &region_selector, "Region", "BuildConfig")?;

        let out = BuildDescriptor {
            cdn_build_key: Self::md5_field(&doc, row, "BuildConfig")?,
            cdn_config_key: Self::md5_field(&doc, row, "CDNConfig")?,
            build_number: doc.value(row, "BuildId").and_then(|v| v.parse().ok()),
            version_name: doc.value(row, "VersionsName").map(str::to_string),
            ..Default::default()
        };
        Ok(out)
    }

    /// `.build.db` is a single pipe-separated row with fixed positions:
    /// `build-key|cdn-key|cdn-path|cdn-hosts|tags|version`.
    fn parse_build_db(text: &str) -> Result<Self> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or(Error::DescriptorSyntax)?;
        let cols: Vec<&str> = line.split('|').collect();
        if cols.len() < 2 {
            return Err(Error::DescriptorSyntax);
        }

        let mut out = BuildDescriptor {
            cdn_build_key: Some(parse_md5_string(cols[0])?),
            cdn_config_key: Some(parse_md5_string(cols[1])?),
            ..Default::default()
        };
        if let Some(tags) = cols.get(4) {
            out.default_locale = locale_mask_from_tags(tags);
        }
        if let Some(version) = cols.get(5) {
            out.build_number = build_number_from_version(version);
            out.version_name = Some(version.to_string());
        }
        Ok(out)
    }

    /// Select the active row: by build key prefix if requested, else by
    /// region, else the first row flagged `Active = 1`, else the first row.
    fn select_row<'a>(
        doc: &'a BpsvDocument,
        selector: &RowSelector,
        region_field: &str,
        build_key_field: &str,
    ) -> Result<&'a [String]> {
        let rows = doc.rows();

        if let Some(wanted) = selector.build_key {
            return rows
                .iter()
                .find(|r| {
                    doc.value(r, build_key_field)
                        .is_some_and(|v| v.starts_with(wanted))
                })
                .map(Vec::as_slice)
                .ok_or(Error::BuildRowNotFound);
        }

        if let Some(region) = selector.region {
            return rows
                .iter()
                .find(|r| {
                    doc.value(r, region_field)
                        .is_some_and(|v| v.eq_ignore_ascii_case(region))
                })
                .map(Vec::as_slice)
                .ok_or(Error::BuildRowNotFound);
        }

        if doc.field_index("Active").is_some() {
            if let Some(row) = rows.iter().find(|r| doc.value(r, "Active") == Some("1")) {
                return Ok(row);
            }
        }

        rows.first().map(Vec::as_slice).ok_or(Error::BuildRowNotFound)
    }

    fn md5_field(doc: &BpsvDocument, row: &[String], name: &str) -> Result<Option<Md5>> {
        match doc.value(row, name) {
            None | Some("") => Ok(None),
            Some(v) => parse_md5_string(v).map(Some),
        }
    }
}
