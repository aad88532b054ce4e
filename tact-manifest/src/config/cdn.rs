use crate::config::parser::*;
use crate::{Error, Md5, Result};
use tracing::*;

/// CDN configuration document.
///
/// Lists the data archives the CDN carries for the build, plus the combined
/// index groups.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CdnConfig {
    /// Keys of all archives.
    pub archives: Option<Vec<Md5>>,
    pub archives_index_size: Option<Vec<u32>>,

    /// Key of the combined index file.
    pub archive_group: Option<Md5>,

    /// Keys of patch archives.
    pub patch_archives: Option<Vec<Md5>>,
    pub patch_archives_index_size: Option<Vec<u32>>,
    pub patch_archive_group: Option<Md5>,

    pub file_index: Option<Md5>,
    pub file_index_size: Option<u32>,
}

impl ConfigParsableInternal for CdnConfig {
    fn handle_kv(o: &mut Self, k: &str, v: &str) -> Result<()> {
        let k = k.to_ascii_lowercase();
        match k.as_str() {
            "archives" => {
                o.archives = Some(parse_md5s_string(v)?);
            }
            "archives-index-size" => {
                o.archives_index_size = Some(parse_u32s_string(v)?);
            }
            "archive-group" => {
                o.archive_group = Some(parse_md5_string(v)?);
            }
            "patch-archives" => {
                o.patch_archives = Some(parse_md5s_string(v)?);
            }
            "patch-archives-index-size" => {
                o.patch_archives_index_size = Some(parse_u32s_string(v)?);
            }
            "patch-archive-group" => {
                o.patch_archive_group = Some(parse_md5_string(v)?);
            }
            "file-index" => {
                o.file_index = Some(parse_md5_string(v)?);
            }
            "file-index-size" => {
                o.file_index_size = Some(v.parse().map_err(|_| Error::ConfigTypeMismatch)?);
            }
            _ => {
                warn!("Unknown config key: {k:?}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParsable;

    #[test]
    fn test_parse_cdn_config() {
        let text = "\
# CDN Configuration
archives = aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb
archives-index-size = 1000 2000
archive-group = cccccccccccccccccccccccccccccccc
";
        let cfg = CdnConfig::parse_config(text.as_bytes()).unwrap();
        assert_eq!(cfg.archives.as_deref(), Some(&[[0xAA; 16], [0xBB; 16]][..]));
        assert_eq!(cfg.archives_index_size.as_deref(), Some(&[1000, 2000][..]));
        assert_eq!(cfg.archive_group, Some([0xCC; 16]));
        assert_eq!(cfg.patch_archives, None);
    }
}
