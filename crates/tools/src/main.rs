use std::path::PathBuf;

use clap::{Parser, Subcommand};
use page::EngineSettings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and exercise dashboard page configs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a page config and list what it declares
    Validate { page: PathBuf },

    /// Compute class breaks for a JSON array of values or rows
    Classify {
        values: PathBuf,

        /// jenks, standardDeviation or headTail
        #[arg(long, default_value = "jenks", value_parser = tools::parse_method)]
        method: formats::ClassificationMethod,

        #[arg(long, default_value_t = 7)]
        classes: usize,

        /// Row field holding the value
        #[arg(long, default_value = "value")]
        field: String,
    },

    /// Pick categorical, continuous or diverging for a value sample
    Style {
        values: PathBuf,

        #[arg(long)]
        base: String,

        #[arg(long, default_value = "value")]
        field: String,
    },

    /// Substitute name=value pairs into a path template
    Resolve {
        template: String,

        #[arg(value_parser = tools::parse_assignment)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// Load a page against files on disk and print the render surface calls
    Simulate {
        page: PathBuf,

        /// Directory that data and metadata paths resolve into
        #[arg(long)]
        data: PathBuf,

        /// Filter selections applied after load, as filterId=value
        #[arg(long = "set", value_parser = tools::parse_assignment)]
        selections: Vec<(String, serde_json::Value)>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Validate { page } => {
            let summary = tools::validate(&page)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Classify {
            values,
            method,
            classes,
            field,
        } => {
            let values = tools::read_values(&values, &field)?;
            let result = tools::classify_values(&values, method, classes);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Style { values, base, field } => {
            let values = tools::read_values(&values, &field)?;
            println!("{}", tools::style_for(&values, &base));
        }
        Command::Resolve { template, params } => {
            println!("{}", tools::resolve(&template, &params)?);
        }
        Command::Simulate {
            page,
            data,
            selections,
        } => {
            let calls = tools::simulate(&page, &data, EngineSettings::from_env(), &selections).await?;
            for call in calls {
                println!("{}", serde_json::to_string(&call)?);
            }
        }
    }

    Ok(())
}
