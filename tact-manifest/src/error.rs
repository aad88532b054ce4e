use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("File has incorrect magic - possibly wrong file format")]
    BadMagic,

    #[error("Unsupported manifest header layout")]
    BadFormat,

    #[error("Manifest data is truncated")]
    Truncated,

    #[error("Page first key does not match the page table entry")]
    PageFirstKeyMismatch,

    #[error("Page checksum mismatch")]
    ChecksumMismatch,

    #[error("Config parser syntax error")]
    ConfigSyntax,

    #[error("Config parser parameter type mismatch")]
    ConfigTypeMismatch,

    #[error("Build descriptor syntax error")]
    DescriptorSyntax,

    #[error("No descriptor row matches the requested region or build key")]
    BuildRowNotFound,
}
