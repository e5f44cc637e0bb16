use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blockflow::{BlockflowError, Context, EngineConfig, ExecutionModel, Interpreter, ModuleLoader};

#[derive(Parser)]
#[command(name = "blockflow")]
#[command(about = "Inspect and run block programs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra directory searched for imported modules
    #[arg(short = 'I', long = "module-path", global = true)]
    module_paths: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the regenerated program
    Code {
        /// Program source
        script: PathBuf,

        /// Print the stored model as JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Print each statement with the statements it reads from
    Deps {
        /// Program source
        script: PathBuf,
    },

    /// Print the sub-program linking the given inputs and outputs
    Restrict {
        /// Program source
        script: PathBuf,

        /// Names the sub-program starts from
        #[arg(long, value_delimiter = ',')]
        inputs: Option<Vec<String>>,

        /// Names the sub-program must compute
        #[arg(long, value_delimiter = ',')]
        outputs: Option<Vec<String>>,
    },

    /// Run the program and print the resulting context as JSON
    Run {
        /// Program source
        script: PathBuf,

        /// JSON object with the initial context
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Only run what depends on these names
        #[arg(long, value_delimiter = ',')]
        inputs: Option<Vec<String>>,

        /// Only run what these names depend on
        #[arg(long, value_delimiter = ',')]
        outputs: Option<Vec<String>>,
    },
}

/// Interpreter errors hold runtime values and are not `Send`; keep their
/// message only.
fn report(err: BlockflowError) -> anyhow::Error {
    anyhow::anyhow!("{}", err)
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).map_err(report)?,
        None => EngineConfig::from_env(),
    };
    config.module_paths.extend(cli.module_paths.iter().cloned());
    Ok(config)
}

fn load_model(loader: &ModuleLoader, script: &Path) -> Result<ExecutionModel> {
    let source = std::fs::read_to_string(script)
        .with_context(|| format!("reading {}", script.display()))?;
    let model = ExecutionModel::from_source_with(loader, &source)
        .map_err(report)
        .with_context(|| format!("building model from {}", script.display()))?;
    Ok(model)
}

fn load_context(path: Option<&Path>) -> Result<Context> {
    let Some(path) = path else {
        return Ok(Context::new("root"));
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    Context::from_json("root", &json).map_err(report)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = engine_config(&cli)?;
    let interp = Interpreter::new(config);
    let loader = interp.loader().clone();

    match cli.command {
        Commands::Code { script, json } => {
            let model = load_model(&loader, &script)?;
            if json {
                println!("{}", model.to_json().map_err(report)?);
            } else {
                print!("{}", model.code());
            }
        }

        Commands::Deps { script } => {
            let model = load_model(&loader, &script)?;
            for (consumer, producers) in model.dependency_graph() {
                let Some(statement) = model.find(consumer) else {
                    continue;
                };
                println!("{} {}", consumer, statement.call_signature().replace('\n', " / "));
                for producer in producers {
                    println!("    <- {}", producer);
                }
            }
        }

        Commands::Restrict {
            script,
            inputs,
            outputs,
        } => {
            let model = load_model(&loader, &script)?;
            let restricted = model.restrict(inputs.as_deref(), outputs.as_deref());
            print!("{}", restricted.code());
        }

        Commands::Run {
            script,
            context,
            inputs,
            outputs,
        } => {
            let model = load_model(&loader, &script)?;
            let ctx = load_context(context.as_deref())?;
            let outcome = model
                .execute(&ctx, inputs.as_deref(), outputs.as_deref(), &interp)
                .map_err(report)?;
            for skipped in &outcome.skipped {
                eprintln!("skipped {}", skipped);
            }
            let json = ctx.to_json().map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
