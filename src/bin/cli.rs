//! Binary entry point for the circuitview CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use circuitview::{
    config::Settings,
    logging,
    population::{Query, QueryValue, Scalar},
    query::{Modality, NodeTable},
    service::{CircuitRef, CircuitService, NodeCounts, NodeSetNames, Populations},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "circuitview",
    version,
    about = "Query and sample node populations of circuits",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, help = "Settings file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Log filter, overriding the settings")]
    log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Json,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export node attributes of a circuit
    Export(ExportCmd),
    /// Write a sampled nodes file
    Sample(SampleCmd),
    /// Count the nodes per population
    Count(PopulationArgs),
    /// List the attributes per population
    Attributes(AttributesCmd),
    /// List the distinct values of string attributes
    Values(ValuesCmd),
    /// List the node sets of a circuit
    NodeSets(CircuitArgs),
}

#[derive(Args, Debug)]
struct CircuitArgs {
    #[arg(long, help = "Circuit id registered in the settings")]
    circuit_id: Option<String>,

    #[arg(long, help = "Circuit config file")]
    input_path: Option<PathBuf>,
}

impl CircuitArgs {
    fn circuit_ref(&self) -> Result<CircuitRef, Box<dyn Error>> {
        if self.circuit_id.is_none() && self.input_path.is_none() {
            return Err("either --circuit-id or --input-path is required".into());
        }
        Ok(CircuitRef {
            id: self.circuit_id.clone(),
            path: self.input_path.clone(),
        })
    }
}

#[derive(Args, Debug)]
struct PopulationArgs {
    #[command(flatten)]
    circuit: CircuitArgs,

    #[arg(long, help = "Node population name")]
    population_name: Option<String>,
}

#[derive(Args, Debug)]
struct ExportCmd {
    #[command(flatten)]
    target: PopulationArgs,

    #[arg(long, default_value_t = 0.01, help = "Fraction of nodes to keep")]
    sampling_ratio: f64,

    #[arg(long, default_value_t = 0, help = "Sampling seed")]
    seed: u64,

    #[arg(long, value_enum, help = "Attribute groups to export (all when omitted)")]
    modality: Vec<Modality>,

    #[arg(long, help = "Region id, acronym or ontology term")]
    region: Vec<String>,

    #[arg(long, help = "Morphological type")]
    mtype: Vec<String>,

    #[arg(long, help = "Restrict to a node set")]
    node_set: Option<String>,

    #[arg(long, help = "Read from and populate the sampled circuit cache")]
    use_cache: bool,

    #[arg(long, help = "Write the result to a file instead of stdout")]
    output_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SampleCmd {
    #[command(flatten)]
    circuit: CircuitArgs,

    #[arg(long, help = "Node population name")]
    population_name: String,

    #[arg(long, default_value_t = 0.01, help = "Fraction of nodes to keep")]
    sampling_ratio: f64,

    #[arg(long, default_value_t = 0, help = "Sampling seed")]
    seed: u64,

    #[arg(long = "attribute", help = "Attribute to keep (all when omitted)")]
    attributes: Vec<String>,

    #[arg(long, help = "Sampled nodes file to write")]
    output_path: PathBuf,
}

#[derive(Args, Debug)]
struct AttributesCmd {
    #[command(flatten)]
    target: PopulationArgs,

    #[arg(long, help = "Report the type of each attribute")]
    dtypes: bool,
}

#[derive(Args, Debug)]
struct ValuesCmd {
    #[command(flatten)]
    target: PopulationArgs,

    #[arg(long = "attribute", help = "Attribute to inspect (all when omitted)")]
    attributes: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.clone())?;
    if let Some(level) = &cli.log_level {
        settings.log.level = level.clone();
    }
    logging::init(&settings.log)?;
    let service = CircuitService::new(settings)?;

    match &cli.command {
        Command::Export(cmd) => run_export(&service, cmd, cli.format)?,
        Command::Sample(cmd) => {
            let mapping = service.sample(
                &cmd.circuit.circuit_ref()?,
                None,
                &cmd.output_path,
                &cmd.population_name,
                cmd.sampling_ratio,
                cmd.seed,
                &cmd.attributes,
            )?;
            let sampled: usize = mapping.values().map(Vec::len).sum();
            info!(sampled, output = %cmd.output_path.display(), "sampling done");
            emit(cli.format, &mapping, |_| {
                println!("wrote {sampled} nodes to {}", cmd.output_path.display())
            })?;
        }
        Command::Count(args) => {
            let path = input_path(&service, &args.circuit)?;
            let counts = service.count(&path, args.population_name.as_deref())?;
            emit(cli.format, &counts, |_| print_counts_text(&counts))?;
        }
        Command::Attributes(cmd) => {
            let path = input_path(&service, &cmd.target.circuit)?;
            let population = cmd.target.population_name.as_deref();
            if cmd.dtypes {
                let dtypes = service.attribute_dtypes(&path, population)?;
                emit(cli.format, &dtypes, |_| {
                    for (name, types) in &dtypes.populations {
                        println!("{name}:");
                        for (attribute, dtype) in types {
                            println!("  {attribute}: {dtype}");
                        }
                    }
                })?;
            } else {
                let names = service.attribute_names(&path, population)?;
                emit(cli.format, &names, |_| print_lists_text(&names))?;
            }
        }
        Command::Values(cmd) => {
            let path = input_path(&service, &cmd.target.circuit)?;
            let attributes = (!cmd.attributes.is_empty()).then_some(cmd.attributes.as_slice());
            let values = service.attribute_values(
                &path,
                cmd.target.population_name.as_deref(),
                attributes,
            )?;
            emit(cli.format, &values, |_| {
                for (name, props) in &values.populations {
                    println!("{name}:");
                    for (attribute, distinct) in props {
                        println!("  {attribute}: {}", distinct.join(", "));
                    }
                }
            })?;
        }
        Command::NodeSets(args) => {
            let path = input_path(&service, args)?;
            let names = service.node_set_names(&path);
            emit(cli.format, &names, |_| print_node_sets_text(&names))?;
        }
    }

    Ok(())
}

fn run_export(
    service: &CircuitService,
    cmd: &ExportCmd,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    info!("starting export");
    let circuit = cmd.target.circuit.circuit_ref()?;
    let params = service.circuit_params(
        &circuit,
        None,
        cmd.target.population_name.as_deref(),
        Modality::to_attributes(&cmd.modality),
        cmd.sampling_ratio,
        cmd.seed,
        cmd.use_cache,
    )?;
    let mut query = Query::new();
    for (name, values) in [("region", &cmd.region), ("mtype", &cmd.mtype)] {
        if !values.is_empty() {
            query.insert(
                name.to_string(),
                QueryValue::Many(values.iter().cloned().map(Scalar::Str).collect()),
            );
        }
    }
    let queries = if query.is_empty() { Vec::new() } else { vec![query] };
    let table = service.export(&params, &queries, cmd.node_set.as_deref())?;
    match &cmd.output_path {
        Some(path) => write_table(path, &table, format)?,
        None => emit(format, &table, |_| {
            let stdout = std::io::stdout();
            let _ = write_table_text(&mut stdout.lock(), &table);
        })?,
    }
    info!(rows = table.len(), "export done");
    Ok(())
}

fn input_path(service: &CircuitService, args: &CircuitArgs) -> Result<PathBuf, Box<dyn Error>> {
    Ok(service.circuit_config_path(&args.circuit_ref()?, None)?)
}

fn write_table(path: &Path, table: &NodeTable, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        OutputFormat::Json => serde_json::to_writer(&mut writer, table)?,
        OutputFormat::Text => write_table_text(&mut writer, table)?,
    }
    writer.flush()?;
    Ok(())
}

fn write_table_text(out: &mut impl Write, table: &NodeTable) -> std::io::Result<()> {
    writeln!(out, "{}", table.column_names().join("\t"))?;
    for row in table.rows() {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_counts_text(counts: &NodeCounts) {
    for (name, population) in &counts.nodes.populations {
        println!("{name}: {}", population.size);
    }
}

fn print_lists_text(lists: &Populations<Vec<String>>) {
    for (name, items) in &lists.populations {
        println!("{name}: {}", items.join(", "));
    }
}

fn print_node_sets_text(names: &NodeSetNames) {
    for name in &names.node_sets {
        println!("{name}");
    }
}
