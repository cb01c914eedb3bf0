#![deny(rust_2018_idioms)]
//! Headless engine for metadata-driven CRUD windows.
//!
//! A server describes each screen as a window config. `domain` parses it into
//! a typed schema tree, `schema` derives validators and defaults from that
//! tree, `form` renders and drives one dialog, and `app` runs the list/tree
//! lifecycle of a window against an [`app::ApiClient`].

pub mod app;
pub mod domain;
pub mod error;
pub mod form;
pub mod i18n;
pub mod io;
pub mod records;
pub mod schema;

pub use app::{
    ApiClient, ControllerOptions, DialogHost, DialogSession, WindowController, WindowMetadataCache,
};
pub use domain::{Node, Permission, Record, WindowConfig};
pub use error::{ApiError, FieldErrors, WindowError};
pub use form::FormRenderer;

pub mod prelude {
    pub use super::app::{
        ApiClient, ApiRequest, CacheStore, ControllerOptions, DialogHost, DialogKind,
        DialogRequest, DialogSession, MemoryCacheStore, SubmitOutcome, Toast, WindowController,
        WindowMetadataCache,
    };
    pub use super::domain::{EditMode, Node, Permission, Record, WindowConfig};
    pub use super::error::{ApiError, FieldErrors, WindowError};
    pub use super::form::{FormEvent, FormRenderer, Reaction, ViewNode};
    pub use super::i18n::{MapTranslator, NoTranslation, Translator};
}
