//! Partwright CLI Tool
//!
//! Command-line interface for planning, applying and maintaining partitioned tables.
//! Plans are described in TOML plan files; see `partwright_cli::plan_file`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use partwright::catalog;
use partwright::{
    apply_plan, connect, MayPostgresExecutor, PartitionBounds, PartitionConfig, PartitionFlags,
    PartitionMaintenance, PartitionPlan, PartitionValue, RecordingExecutor,
};
use partwright_cli::PlanFile;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "partwright")]
#[command(about = "Declarative PostgreSQL partition management")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Configuration file (default: config/partwright.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a plan file and print the DDL without touching the database
    Plan {
        /// Plan file (TOML)
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: PlanFormat,
    },

    /// Apply a plan file in a single transaction
    Apply {
        /// Plan file (TOML)
        file: PathBuf,

        /// Dry run - execute against an in-memory recorder instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Attach an existing table as a partition
    Attach {
        /// Partitioned parent table
        table: String,
        /// Table to attach
        partition: String,

        /// Lower range bound
        #[arg(long, requires = "to", conflicts_with_all = ["values", "modulus"])]
        from: Option<String>,
        /// Upper range bound (exclusive)
        #[arg(long, requires = "from")]
        to: Option<String>,

        /// List values, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with = "modulus")]
        values: Vec<String>,

        /// Hash modulus
        #[arg(long, requires = "remainder")]
        modulus: Option<u32>,
        /// Hash remainder
        #[arg(long, requires = "modulus")]
        remainder: Option<u32>,
    },

    /// Detach a partition, keeping it as a standalone table
    Detach {
        table: String,
        partition: String,

        /// Detach without blocking concurrent queries
        #[arg(long)]
        concurrently: bool,
    },

    /// Drop a partition
    Drop { table: String, partition: String },

    /// Refresh planner statistics
    Analyze {
        table: String,

        /// Analyze a single partition instead of the whole table
        #[arg(long)]
        partition: Option<String>,
    },

    /// Reclaim storage
    Vacuum {
        table: String,

        /// Vacuum a single partition instead of the whole table
        #[arg(long)]
        partition: Option<String>,

        /// Run VACUUM FULL
        #[arg(long)]
        full: bool,
    },

    /// List the partitions of a table
    List { table: String },

    /// Drop date range partitions starting before a date
    Prune {
        table: String,

        /// Cut-off date (YYYY-MM-DD); partitions starting before it are dropped
        #[arg(long)]
        before: NaiveDate,

        /// Dry run - list the partitions that would be dropped
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PlanFormat {
    Text,
    Json,
    Sql,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let result = run(&cli);

    match result {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let flags = PartitionFlags::from(&config.defaults);

    match &cli.command {
        Commands::Plan { file, format } => handle_plan(&config, file, *format),
        Commands::Apply { file, dry_run } => handle_apply(cli, &config, file, *dry_run),
        Commands::Attach {
            table,
            partition,
            from,
            to,
            values,
            modulus,
            remainder,
        } => {
            let bounds = attach_bounds(from.as_deref(), to.as_deref(), values, *modulus, *remainder)?;
            let executor = open_database(cli)?;
            PartitionMaintenance::new(table.as_str(), flags)
                .attach_partition(&executor, partition, &bounds)?;
            println!("🔗 Attached {} to {}", partition.bold(), table.bold());
            Ok(())
        }
        Commands::Detach {
            table,
            partition,
            concurrently,
        } => {
            let executor = open_database(cli)?;
            let concurrently = concurrently.then_some(true);
            PartitionMaintenance::new(table.as_str(), flags)
                .detach_partition(&executor, partition, concurrently)?;
            println!("✂️  Detached {} from {}", partition.bold(), table.bold());
            Ok(())
        }
        Commands::Drop { table, partition } => {
            let executor = open_database(cli)?;
            PartitionMaintenance::new(table.as_str(), flags).drop_partition(&executor, partition)?;
            println!("🗑️  Dropped {}", partition.bold());
            Ok(())
        }
        Commands::Analyze { table, partition } => {
            let executor = open_database(cli)?;
            let maintenance = PartitionMaintenance::new(table.as_str(), flags);
            match partition {
                Some(partition) => maintenance.analyze_partition(&executor, partition)?,
                None => maintenance.analyze(&executor)?,
            }
            Ok(())
        }
        Commands::Vacuum {
            table,
            partition,
            full,
        } => {
            let executor = open_database(cli)?;
            let maintenance = PartitionMaintenance::new(table.as_str(), flags);
            match partition {
                Some(partition) => maintenance.vacuum_partition(&executor, partition, *full)?,
                None => maintenance.vacuum(&executor, *full)?,
            }
            Ok(())
        }
        Commands::List { table } => handle_list(&open_database(cli)?, table),
        Commands::Prune {
            table,
            before,
            dry_run,
        } => handle_prune(&open_database(cli)?, table, *before, *dry_run, flags),
    }
}

fn load_config(path: Option<&str>) -> Result<PartitionConfig> {
    let config = match path {
        Some(path) => PartitionConfig::load_from(path),
        None => PartitionConfig::load(),
    };
    config.context("Failed to load partwright configuration")
}

fn database_url(cli: &Cli) -> Result<String> {
    cli.database_url
        .clone()
        .or_else(|| std::env::var("PARTWRIGHT_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("Database URL not provided. Use --database-url or set PARTWRIGHT_DATABASE_URL or DATABASE_URL environment variable.")
}

fn open_database(cli: &Cli) -> Result<MayPostgresExecutor> {
    let url = database_url(cli)?;
    log::debug!("Connecting to database");
    connect(&url).context("Error connecting to database")
}

fn load_plan(config: &PartitionConfig, file: &Path) -> Result<PartitionPlan> {
    let plan_file = PlanFile::load(file)?;
    log::debug!("Loaded plan file {} for table '{}'", file.display(), plan_file.table);
    let builder = plan_file
        .to_builder(config)
        .with_context(|| format!("Invalid plan file {}", file.display()))?;
    let plan = builder
        .synthesize()
        .with_context(|| format!("Failed to synthesize {}", file.display()))?;
    Ok(plan)
}

fn handle_plan(config: &PartitionConfig, file: &Path, format: PlanFormat) -> Result<()> {
    let plan = load_plan(config, file)?;

    match format {
        PlanFormat::Sql => print!("{}", plan.to_sql_script()),
        PlanFormat::Json => {
            let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
            println!("{json}");
        }
        PlanFormat::Text => print_plan(&plan),
    }
    Ok(())
}

fn print_plan(plan: &PartitionPlan) {
    println!("\n📋 Partition plan for {}\n", plan.table().bold());
    for (i, step) in plan.iter().enumerate() {
        println!("  {}. {}", i + 1, step.role.to_string().cyan());
        println!("     {}", step.sql);
    }
    println!(
        "\n📈 Summary: {} statements, checksum {}",
        plan.len(),
        plan.checksum().dimmed()
    );
    if plan.flags().pruning_enabled {
        println!("   Partition pruning expected to be enabled on the server");
    }
}

fn handle_apply(cli: &Cli, config: &PartitionConfig, file: &Path, dry_run: bool) -> Result<()> {
    let plan = load_plan(config, file)?;

    if plan.is_empty() {
        println!("Nothing to apply");
        return Ok(());
    }

    if dry_run {
        let recorder = RecordingExecutor::new();
        let report = apply_plan(&plan, &recorder)?;
        println!("Would apply {} statement(s):", report.statements_executed);
        for (i, sql) in recorder.committed().iter().enumerate() {
            println!("  {}. {}", i + 1, sql);
        }
        return Ok(());
    }

    let executor = open_database(cli)?;
    println!("Applying partition plan for {}...", plan.table().bold());
    let report = apply_plan(&plan, &executor)?;
    println!(
        "✅ Applied {} statement(s) in {:?} (checksum {})",
        report.statements_executed,
        report.elapsed,
        report.checksum.dimmed()
    );
    Ok(())
}

fn handle_list(executor: &MayPostgresExecutor, table: &str) -> Result<()> {
    let Some(strategy) = catalog::partition_strategy(executor, table)? else {
        bail!("'{table}' is not a partitioned table");
    };

    let partitions = catalog::list_partitions(executor, table)?;
    let columns = catalog::partition_columns(executor, table)?;
    let size = catalog::table_size(executor, table)?;

    println!(
        "\n📊 {} (PARTITION BY {} ({}), {})\n",
        table.bold(),
        strategy,
        columns.join(", "),
        size
    );

    if partitions.is_empty() {
        println!("No partitions");
    }
    for partition in &partitions {
        println!(
            "  {} {} [{}, {} rows]",
            partition.name.bold(),
            partition.bound_expression.as_deref().unwrap_or("-"),
            partition.size,
            partition.row_count
        );
    }

    println!(
        "\n📈 Summary: {} partitions",
        catalog::partition_count(executor, table)?
    );
    Ok(())
}

fn handle_prune(
    executor: &MayPostgresExecutor,
    table: &str,
    before: NaiveDate,
    dry_run: bool,
    flags: PartitionFlags,
) -> Result<()> {
    if dry_run {
        let partitions = catalog::list_partitions(executor, table)?;
        let old = catalog::partitions_older_than(&partitions, before);
        if old.is_empty() {
            println!("No partitions of {table} start before {before}");
            return Ok(());
        }
        println!("Would drop {} partition(s):", old.len());
        for partition in old {
            println!("  🗑️  {}", partition.name);
        }
        return Ok(());
    }

    let maintenance = PartitionMaintenance::new(table, flags);
    let dropped = catalog::drop_partitions_before(executor, table, before, &maintenance)?;
    println!("🗑️  Dropped {} partition(s) of {}", dropped.len(), table.bold());
    for name in dropped {
        println!("  ✓ {name}");
    }
    Ok(())
}

/// Bounds for `attach` from exactly one of the range, list or hash flag groups
fn attach_bounds(
    from: Option<&str>,
    to: Option<&str>,
    values: &[String],
    modulus: Option<u32>,
    remainder: Option<u32>,
) -> Result<PartitionBounds> {
    let bounds = match (from, to, values.is_empty(), modulus, remainder) {
        (Some(from), Some(to), true, None, None) => {
            PartitionBounds::range(PartitionValue::infer(from), PartitionValue::infer(to))?
        }
        (None, None, false, None, None) => {
            PartitionBounds::list(values.iter().map(|v| PartitionValue::infer(v)))?
        }
        (None, None, true, Some(modulus), Some(remainder)) => {
            PartitionBounds::hash(modulus, remainder)?
        }
        _ => bail!("Specify exactly one of --from/--to, --values or --modulus/--remainder"),
    };
    Ok(bounds)
}
