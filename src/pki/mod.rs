//! PKI primitives (spec §4.1): pure functions over byte buffers, no I/O.
//! Every parser returns a tagged error; nothing here ever panics on
//! attacker-controlled input.

pub mod cms;
pub mod country;
pub mod crl;
pub mod dg2;
pub mod digest;
pub mod mrz;
pub mod sod;
pub mod x509;

pub use cms::CmsSignedData;
pub use crl::parse_crl;
pub use dg2::{parse_dg2, Dg2Image, ImageFormat};
pub use digest::DigestAlgorithm;
pub use mrz::{DocumentFormat, Mrz};
pub use sod::LdsSecurityObject;
pub use x509::ParsedCertificate;
