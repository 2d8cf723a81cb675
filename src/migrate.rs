//! Command handlers: single-sheet migration, plan execution, header inspection.

use std::path::Path;

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::info;
use rayon::prelude::*;

use crate::{
    cli::{HeadersArgs, MigrateArgs, PlanArgs},
    export::{write_failures, write_records},
    header::{ColumnRole, HeaderMap},
    io_utils::{resolve_delimiter, resolve_encoding},
    lookup::LookupIndex,
    plan::{MigrationPlan, register_keys},
    record::{RecordAssembler, RecordOutcome},
    report::MigrationReport,
    schema::{ModelSchema, SchemaCatalog},
    sheet::{ReadOptions, Sheet, read_headers, read_sheet},
    table::render_table,
};

/// Assembles every row of `sheet`. With `jobs > 1` rows fan out over a rayon
/// pool sharing the schema and lookup index read-only.
pub fn migrate_sheet(
    model: &ModelSchema,
    sheet: &Sheet,
    lookup: &LookupIndex,
    jobs: usize,
) -> Result<MigrationReport> {
    info!(
        "Migrating {} row(s) of '{}' into {}",
        sheet.rows.len(),
        sheet.name,
        model.name
    );
    let assembler = RecordAssembler::new(model, &sheet.headers);
    let ignored = assembler.header_map().unknown_headers().collect::<Vec<_>>();
    if !ignored.is_empty() {
        info!(
            "{}: ignoring column(s) with no matching field: {}",
            model.name,
            ignored.iter().join(", ")
        );
    }

    let outcomes: Vec<RecordOutcome> = if jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("Building worker pool")?;
        pool.install(|| {
            sheet
                .rows
                .par_iter()
                .map(|row| assembler.assemble(row.index, &row.cells, lookup))
                .collect()
        })
    } else {
        sheet
            .rows
            .iter()
            .map(|row| assembler.assemble(row.index, &row.cells, lookup))
            .collect()
    };

    let mut report = MigrationReport::new(&model.name);
    report.extend(outcomes);
    report.finalize();
    Ok(report)
}

pub fn load_lookups(paths: &[impl AsRef<Path>]) -> Result<LookupIndex> {
    let mut index = LookupIndex::default();
    for path in paths {
        let path = path.as_ref();
        let loaded =
            LookupIndex::load(path).with_context(|| format!("Loading lookup file {path:?}"))?;
        info!(
            "Loaded lookup data for {} from {path:?}",
            loaded.model_names().join(", ")
        );
        index.merge(loaded);
    }
    Ok(index)
}

pub fn execute(args: &MigrateArgs) -> Result<()> {
    let catalog = SchemaCatalog::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    let model = catalog.require_model(&args.model)?;
    let lookup = load_lookups(&args.lookups)?;
    let options = ReadOptions {
        sheet: Some(args.sheet.clone().unwrap_or_else(|| args.model.clone())),
        delimiter: args.delimiter,
        encoding: resolve_encoding(args.input_encoding.as_deref())?,
    };
    let sheet = read_sheet(&args.input, &options)
        .with_context(|| format!("Reading sheet from {:?}", args.input))?;
    let report = migrate_sheet(model, &sheet, &lookup, args.jobs)?;

    if let Some(path) = &args.records {
        write_records(&report, path)?;
    }
    if let Some(path) = &args.failures {
        let encoding = resolve_encoding(args.output_encoding.as_deref())?;
        let delimiter = resolve_delimiter(path, args.delimiter);
        write_failures(&report, path, delimiter, encoding)?;
    }
    if args.records.as_deref().is_none_or(|path| path != Path::new("-")) {
        print!("{}", report.render_summary());
    }
    if args.fail_on_error && report.failure_count() > 0 {
        bail!(
            "{} of {} row(s) failed validation for {}",
            report.failure_count(),
            report.total(),
            model.name
        );
    }
    Ok(())
}

pub fn execute_plan(args: &PlanArgs) -> Result<()> {
    let plan = MigrationPlan::load(&args.plan)?;
    let catalog = SchemaCatalog::load(&plan.schema)
        .with_context(|| format!("Loading schema from {:?}", plan.schema))?;
    let mut lookup = load_lookups(&plan.lookups)?;
    let jobs = args.jobs.unwrap_or(plan.jobs);

    let mut failed_rows = 0usize;
    for step in &plan.sheets {
        let model = catalog.require_model(&step.model)?;
        let options = ReadOptions {
            sheet: Some(step.sheet.clone().unwrap_or_else(|| step.model.clone())),
            delimiter: step.delimiter,
            encoding: resolve_encoding(step.input_encoding.as_deref())?,
        };
        let sheet = read_sheet(&step.input, &options)
            .with_context(|| format!("Reading sheet for {} from {:?}", step.model, step.input))?;
        let report = migrate_sheet(model, &sheet, &lookup, jobs)?;
        if let Some(path) = &step.records {
            write_records(&report, path)?;
        }
        if let Some(path) = &step.failures {
            let encoding = resolve_encoding(step.output_encoding.as_deref())?;
            let delimiter = resolve_delimiter(path, step.delimiter);
            write_failures(&report, path, delimiter, encoding)?;
        }
        if let Some(key_field) = &step.key_field {
            let added = register_keys(&report, key_field, &mut lookup);
            info!(
                "{}: registered {added} '{key_field}' value(s) for later sheets",
                step.model
            );
        }
        print!("{}", report.render_summary());
        failed_rows += report.failure_count();
    }

    if args.fail_on_error && failed_rows > 0 {
        bail!("{failed_rows} row(s) failed validation across the plan");
    }
    Ok(())
}

/// Rows describing how each header resolves, for display.
pub fn header_rows(map: &HeaderMap) -> Vec<Vec<String>> {
    map.resolutions()
        .iter()
        .map(|resolution| {
            let (role, target) = match &resolution.role {
                ColumnRole::Field { field } => ("field", field.clone()),
                ColumnRole::SubField { field, child } => ("sub-field", format!("{field}.{child}")),
                ColumnRole::Alias { field } => ("reference", field.clone()),
                ColumnRole::Metadata => ("ignored (metadata)", String::new()),
                ColumnRole::Unknown => ("ignored", String::new()),
            };
            vec![
                resolution.header.clone(),
                resolution.normalized.clone(),
                role.to_string(),
                target,
            ]
        })
        .collect()
}

pub fn inspect_headers(args: &HeadersArgs) -> Result<()> {
    let catalog = SchemaCatalog::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    let model = catalog.require_model(&args.model)?;
    let options = ReadOptions {
        sheet: Some(args.sheet.clone().unwrap_or_else(|| args.model.clone())),
        delimiter: args.delimiter,
        encoding: resolve_encoding(args.input_encoding.as_deref())?,
    };
    let headers = read_headers(&args.input, &options)
        .with_context(|| format!("Reading headers from {:?}", args.input))?;
    let map = HeaderMap::build(model, &headers);
    print!(
        "{}",
        render_table(&["header", "normalized", "role", "field"], &header_rows(&map))
    );

    let missing = model
        .fields
        .iter()
        .enumerate()
        .filter(|(idx, field)| {
            field.required && !map.columns(*idx).is_some_and(|columns| columns.is_present())
        })
        .map(|(_, field)| field.name.as_str())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        println!("Required field(s) without a column: {}", missing.join(", "));
    }
    let related = model.related_models();
    if !related.is_empty() {
        println!(
            "Referenced model(s) needing lookup data: {}",
            related.iter().join(", ")
        );
    }
    Ok(())
}
