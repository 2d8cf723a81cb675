pub mod array;
pub mod cli;
pub mod coerce;
pub mod composite;
pub mod data;
pub mod enumeration;
pub mod export;
pub mod failure;
pub mod header;
pub mod io_utils;
pub mod lookup;
pub mod migrate;
pub mod plan;
pub mod record;
pub mod report;
pub mod schema;
pub mod sheet;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

pub use crate::{
    data::{CellValue, RawRow, Value},
    failure::{FailureKind, FieldFailure, FieldWarning},
    lookup::LookupIndex,
    record::{Record, RecordAssembler, RecordFailure, RecordOutcome, assemble_row},
    report::MigrationReport,
    schema::{FieldKind, FieldSchema, ModelSchema, SchemaCatalog},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_migrator", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Migrate(args) => migrate::execute(&args),
        Commands::Plan(args) => migrate::execute_plan(&args),
        Commands::Headers(args) => migrate::inspect_headers(&args),
    }
}
