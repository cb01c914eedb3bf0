mod node;
mod parser;
mod window;

pub use node::{
    AlertNode, ButtonNode, Condition, ConditionFn, Conditions, DataSourceDescriptor, FieldNode,
    FieldType, FieldsetNode, GroupNode, LayoutMode, Node, NodeCommon, Record, RemoteSource, Rules,
    SelectNode, Severity, TabPane, TabsNode, TextNode,
};
pub use parser::{
    CANCEL_ACTION, SUBMIT_ACTION, delete_schema, detail_key, parse_node, parse_window_config,
    schema_for_tab,
};
pub use window::{
    EditMode, FieldConfig, Permission, TabConfig, TreeHints, WindowConfig, record_key, row_key,
};
