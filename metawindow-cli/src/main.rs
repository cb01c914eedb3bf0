use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde_json::{Value, json};

use metawindow::{
    app::envelope_records,
    domain::{WindowConfig, parse_window_config, schema_for_tab},
    i18n::NoTranslation,
    io::{DocumentFormat, OutputTarget, Report, load_document},
    records::{TreeOptions, TreeRow, nest},
    schema::{synthesize_defaults, synthesize_validator},
};

#[derive(Debug, Parser)]
#[command(
    name = "metawindow",
    version,
    about = "Inspect metadata-driven window configs offline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Write the result to this file instead of stdout ("-" is stdout)
    #[arg(short = 'o', long = "output", value_name = "DEST", global = true)]
    output: Option<String>,

    /// Emit compact JSON/TOML rather than pretty formatting
    #[arg(long = "no-pretty", global = true)]
    no_pretty: bool,

    /// Input and output document format (json, yaml, toml); defaults to the file extension
    #[arg(long = "format", value_name = "FORMAT", global = true)]
    format: Option<String>,
}

#[derive(Debug, Args)]
struct WindowArgs {
    /// Window config document (the config endpoint response), or "-" for stdin
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Tab whose form is used
    #[arg(long = "tab", default_value_t = 0)]
    tab: usize,

    /// Key column of the master tab
    #[arg(long = "id-field", default_value = "id")]
    id_field: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default record of a tab
    Defaults(WindowArgs),
    /// Validate a record against a tab; exits non-zero when invalid
    Validate {
        #[command(flatten)]
        window: WindowArgs,
        /// Record document to check
        #[arg(value_name = "RECORD")]
        record: PathBuf,
    },
    /// Print the JSON Schema synthesized from a tab's rules
    Schema(WindowArgs),
    /// Print which operations the window grants
    Permissions(WindowArgs),
    /// Nest a flat record list (array or {data: [...]}) into a tree
    Tree {
        #[arg(value_name = "RECORDS")]
        records: PathBuf,
        #[arg(long = "id-field", default_value = "id")]
        id_field: String,
        #[arg(long = "parent-field", default_value = "parentId")]
        parent_field: String,
        /// Children are ordered by this field
        #[arg(long = "order-field")]
        order_field: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    env_logger::init();
    let cli = Cli::parse();

    let format = cli
        .output
        .format
        .as_deref()
        .map(str::parse::<DocumentFormat>)
        .transpose()
        .map_err(|err| eyre!(err))?;
    let target = OutputTarget::from_arg(cli.output.output.as_deref());
    let report = Report::new(format.or_else(|| target.implied_format()).unwrap_or_default())
        .compact(cli.output.no_pretty);

    let (result, ok) = match &cli.command {
        Command::Defaults(window) => {
            let (_, schema) = load_tab(window, format)?;
            (Value::Object(synthesize_defaults(&schema)), true)
        }
        Command::Validate { window, record } => {
            let (_, schema) = load_tab(window, format)?;
            let record = load(record, format)?;
            let record = record
                .as_object()
                .ok_or_else(|| eyre!("record must be a JSON object"))?;
            let validator = synthesize_validator(&schema, &NoTranslation);
            match validator.validate(record) {
                Ok(()) => (json!({"valid": true, "errors": {}}), true),
                Err(errors) => {
                    log::info!("record rejected: {errors}");
                    (json!({"valid": false, "errors": errors.into_map()}), false)
                }
            }
        }
        Command::Schema(window) => {
            let (_, schema) = load_tab(window, format)?;
            (synthesize_validator(&schema, &NoTranslation).to_json_schema(), true)
        }
        Command::Permissions(window) => {
            let config = load_config(&window.config, format)?;
            (serde_json::to_value(config.permission())?, true)
        }
        Command::Tree {
            records,
            id_field,
            parent_field,
            order_field,
        } => {
            let rows = envelope_records(load(records, format)?)
                .wrap_err_with(|| format!("failed to read records from {}", records.display()))?;
            let tree_options = TreeOptions {
                id_field: id_field.clone(),
                parent_field: parent_field.clone(),
                order_field: order_field.clone(),
            };
            let tree = nest(&rows, &tree_options);
            (Value::Array(tree.iter().map(TreeRow::to_value).collect()), true)
        }
    };

    report
        .write(&result, &target)
        .map_err(|err| eyre!("{err:#}"))?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn load(path: &Path, format: Option<DocumentFormat>) -> Result<Value> {
    load_document(path, format).map_err(|err| eyre!("{err:#}"))
}

fn load_config(path: &Path, format: Option<DocumentFormat>) -> Result<WindowConfig> {
    let raw = load(path, format)?;
    parse_window_config(&raw).map_err(|err| eyre!("{err:#}"))
}

fn load_tab(
    window: &WindowArgs,
    format: Option<DocumentFormat>,
) -> Result<(WindowConfig, metawindow::Node)> {
    let config = load_config(&window.config, format)?;
    let schema = schema_for_tab(&config, window.tab, &window.id_field)
        .map_err(|err| eyre!("{err:#}"))?;
    Ok((config, schema))
}
