use crate::config::parser::*;
use crate::{Error, MaybePair, Md5, Result};
use tracing::*;

/// CDN build document.
///
/// Names the well-known files of the build: for each of ENCODING, DOWNLOAD,
/// INSTALL, ROOT, PATCH, SIZE and the VFS root, a content digest with an
/// optional encoded digest, plus the matching sizes. Only `encoding` is
/// required downstream; everything else may be absent.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CdnBuildConfig {
    pub root: Option<Md5>,

    pub install: Option<MaybePair<Md5>>,
    pub install_size: Option<MaybePair<u32>>,

    pub download: Option<MaybePair<Md5>>,
    pub download_size: Option<MaybePair<u32>>,

    pub size: Option<(Md5, Md5)>,
    pub size_size: Option<(u32, u32)>,

    pub encoding: Option<MaybePair<Md5>>,
    pub encoding_size: Option<MaybePair<u32>>,

    pub patch: Option<Md5>,
    pub patch_size: Option<u32>,
    pub patch_config: Option<Md5>,

    pub vfs_root: Option<(Md5, Md5)>,
    pub vfs_root_size: Option<(u32, u32)>,

    pub build_name: Option<String>,
    pub build_uid: Option<String>,
    pub build_product: Option<String>,
    pub build_num: Option<u32>,
}

impl ConfigParsableInternal for CdnBuildConfig {
    fn handle_kv(o: &mut Self, k: &str, v: &str) -> Result<()> {
        let k = k.to_ascii_lowercase();
        match k.as_str() {
            "root" => {
                o.root = Some(parse_md5_string(v)?);
            }

            "install" => {
                o.install = Some(parse_md5_maybepair_string(v)?);
            }
            "install-size" => {
                o.install_size = Some(parse_u32_maybepair_string(v)?);
            }

            "download" => {
                o.download = Some(parse_md5_maybepair_string(v)?);
            }
            "download-size" => {
                o.download_size = Some(parse_u32_maybepair_string(v)?);
            }

            "size" => {
                o.size = Some(parse_md5_pair_string(v)?);
            }
            "size-size" => {
                o.size_size = Some(parse_u32_pair_string(v)?);
            }

            "encoding" => {
                o.encoding = Some(parse_md5_maybepair_string(v)?);
            }
            "encoding-size" => {
                o.encoding_size = Some(parse_u32_maybepair_string(v)?);
            }

            "patch" => {
                o.patch = Some(parse_md5_string(v)?);
            }
            "patch-size" => {
                o.patch_size = Some(v.parse().map_err(|_| Error::ConfigTypeMismatch)?);
            }
            "patch-config" => {
                o.patch_config = Some(parse_md5_string(v)?);
            }

            "vfs-root" => {
                o.vfs_root = Some(parse_md5_pair_string(v)?);
            }
            "vfs-root-size" => {
                o.vfs_root_size = Some(parse_u32_pair_string(v)?);
            }

            "build-name" => {
                o.build_name = Some(v.to_string());
            }
            "build-uid" => {
                o.build_uid = Some(v.to_string());
            }
            "build-product" => {
                o.build_product = Some(v.to_string());
            }
            "build-num" => {
                o.build_num = Some(v.parse().map_err(|_| Error::ConfigTypeMismatch)?);
            }

            _ => {
                warn!("Unknown config key: {k:?}");
            }
        }

        Ok(())
    }
}

/// Parse two u32s, which are separated by a space.
fn parse_u32_pair_string(v: &str) -> Result<(u32, u32)> {
    match parse_u32_maybepair_string(v)? {
        MaybePair::Pair(a, b) => Ok((a, b)),
        MaybePair::Solo(_) => Err(Error::ConfigTypeMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParsable;

    #[test]
    fn test_parse_cdn_build_config() {
        let text = "\
root = aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
encoding = bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb cccccccccccccccccccccccccccccccc
encoding-size = 380 400
download = dddddddddddddddddddddddddddddddd
download-size = 220
build-name = WOW-45114patch9.2.7
build-uid = wow
";
        let cfg = CdnBuildConfig::parse_config(text.as_bytes()).unwrap();
        assert_eq!(cfg.root, Some([0xAA; 16]));
        assert_eq!(
            cfg.encoding,
            Some(MaybePair::Pair([0xBB; 16], [0xCC; 16]))
        );
        assert_eq!(cfg.encoding_size, Some(MaybePair::Pair(380, 400)));
        assert_eq!(cfg.download, Some(MaybePair::Solo([0xDD; 16])));
        assert_eq!(cfg.download_size, Some(MaybePair::Solo(220)));
        assert_eq!(cfg.build_uid.as_deref(), Some("wow"));
        assert_eq!(cfg.install, None);
        assert_eq!(cfg.vfs_root, None);
    }

    #[test]
    fn test_size_requires_pair() {
        let text = "size = aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n";
        assert!(CdnBuildConfig::parse_config(text.as_bytes()).is_err());
    }
}
