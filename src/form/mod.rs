mod actions;
mod condition;
mod datasource;
pub mod expr;
mod renderer;
mod state;
mod view;

pub use actions::{Dispatch, EventQueue, FormEvent, Reaction};
pub use condition::{CompiledConditions, NodeState};
pub use datasource::{
    DataSourceResolver, ReferenceSearch, SEARCH_TOKEN, encode_component, substitute,
};
pub use renderer::FormRenderer;
pub use state::{FormState, Phase};
pub use view::{
    ActionView, AlertView, Callback, ContainerView, Editor, GridView, LeafHandle, LeafView,
    ViewNode,
};
