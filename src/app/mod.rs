mod api;
mod cache;
mod controller;
mod dialog;
pub(crate) mod input;
mod options;
mod status;

pub use api::{
    ApiClient, ApiRequest, CacheStore, DialogHost, DialogKind, DialogRequest, FileDownload,
    FileTransport, MemoryCacheStore, RawFile, Toast, download, envelope_records, envelope_rows,
    file_name_from_disposition,
};
pub use cache::{CONFIG_PREFIX, INDEX_KEY, WindowMetadataCache, cache_key};
pub use controller::{KeyOutcome, ListQuery, SubmitOutcome, WindowController};
pub use dialog::DialogSession;
pub use input::{ListCommand, classify};
pub use options::{ControllerOptions, Endpoints};
pub use status::LoadStatus;
