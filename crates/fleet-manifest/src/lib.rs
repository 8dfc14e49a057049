//! Image manifest sources (C4, §4.3): fetch, parse, and query simple-streams
//! style catalogs, plus the supplemented blueprint catalog (§2.2).

pub mod blueprint;
pub mod downloader;
pub mod query;
pub mod record;
pub mod refresh;
pub mod remote;
pub mod source;

pub use blueprint::{Blueprint, BlueprintSource, MULTIPASS_BLUEPRINTS_URL_ENV};
pub use downloader::{ReqwestDownloader, UrlDownloader};
pub use query::{ImageQuery, QueryType};
pub use record::ImageRecord;
pub use refresh::RefreshScheduler;
pub use remote::{Manifest, Remote};
pub use source::ManifestSource;
