/// Where a query's `name` should resolve from (§4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Alias,
    LocalFile,
    HttpDownload,
}

/// Resolves to an `ImageRecord` via `ManifestSource::info_for` (§4.2, §4.3).
#[derive(Debug, Clone)]
pub struct ImageQuery {
    pub name: String,
    pub remote: Option<String>,
    pub allow_unsupported: bool,
    pub query_type: QueryType,
}

impl ImageQuery {
    pub fn alias(name: impl Into<String>) -> Self {
        ImageQuery {
            name: name.into(),
            remote: None,
            allow_unsupported: false,
            query_type: QueryType::Alias,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn allowing_unsupported(mut self) -> Self {
        self.allow_unsupported = true;
        self
    }
}
