use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use changeset_describe::augment::{ElementSource, InMemorySource};
use changeset_describe::config::{load_user_config, UserConfig};
use changeset_describe::data::{ChangesetHeader, ElementKey};
use changeset_describe::english::common_name;
use changeset_describe::errors::{Error, Result};
use changeset_describe::etl::describe_changeset::{DescribeChangesetEtl, LocalChangeset};
use changeset_describe::etl::parse_osm::read_document;
use changeset_describe::etl::Etl;
use changeset_describe::features::catalog_yaml::load_catalog;
use changeset_describe::features::{FeatureCatalog, Matcher};
use changeset_describe::osm_api::OsmApi;

#[derive(Parser)]
#[command(name = "changeset-describe")]
#[command(about = "Describe OpenStreetMap changesets in plain English", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Feature catalog (YAML), overrides the config
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a changeset from the OSM API
    Changeset { changeset_id: i64 },

    /// Best feature of one element, e.g. node:123
    Feature { element: String },

    /// Every feature of one element, in catalog order
    AllFeatures { element: String },

    /// Catalog size
    Stats,

    /// Describe a local osmChange file
    File {
        /// osmChange document
        change: PathBuf,

        /// Changeset metadata document, for the user name
        #[arg(long)]
        changeset: Option<PathBuf>,

        /// .osm extract answering parent lookups instead of the API
        #[arg(long)]
        context: Option<PathBuf>,

        /// User name to report
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Serialize)]
struct FeatureReport {
    common_name: String,
    feature: Option<String>,
}

#[derive(Serialize)]
struct AllFeaturesReport {
    common_name: String,
    features: Vec<String>,
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stderr()))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn describe_remote(config: &UserConfig, catalog: &FeatureCatalog, changeset_id: i64) -> Result<()> {
    let api = OsmApi::new(config)?;
    let mut etl = DescribeChangesetEtl::new(
        &api,
        &api,
        Matcher::new(catalog),
        changeset_id,
        config.max_concurrent_lookups(),
    );
    println!("{}", etl.process()?);
    Ok(())
}

fn describe_file(
    config: &UserConfig,
    catalog: &FeatureCatalog,
    change: PathBuf,
    changeset: Option<PathBuf>,
    context: Option<PathBuf>,
    user: Option<String>,
) -> Result<()> {
    let mut header = match changeset {
        Some(path) => read_document(&path)?
            .changeset
            .ok_or_else(|| {
                Error::MalformedElement(format!("{} has no changeset", path.display()))
            })?,
        None => ChangesetHeader::default(),
    };
    if user.is_some() {
        header.user = user;
    }
    let local = LocalChangeset {
        header,
        blocks: read_document(&change)?.blocks,
    };

    let lookups: Box<dyn ElementSource> = match context {
        Some(path) => Box::new(InMemorySource::new(read_document(&path)?.elements)),
        None => Box::new(OsmApi::new(config)?),
    };
    let mut etl = DescribeChangesetEtl::new(
        &local,
        lookups.as_ref(),
        Matcher::new(catalog),
        local.header.id,
        config.max_concurrent_lookups(),
    );
    println!("{}", etl.process()?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_user_config(cli.config.as_deref())?;
    if let Some(catalog_path) = cli.catalog {
        config.catalog_path = catalog_path;
    }
    setup_logging(&config.log_level);

    let catalog = load_catalog(&config.catalog_path)?;
    let matcher = Matcher::new(&catalog);

    match cli.command {
        Commands::Changeset { changeset_id } => describe_remote(&config, &catalog, changeset_id),
        Commands::Feature { element } => {
            let key: ElementKey = element.parse()?;
            let element = OsmApi::new(&config)?.element(key)?;
            let feature = match matcher.match_best(&element) {
                Ok(feature) => Some(feature.name.clone()),
                Err(err) if !err.is_fatal() => None,
                Err(err) => return Err(err),
            };
            print_json(&FeatureReport {
                common_name: common_name(&element),
                feature,
            })
        }
        Commands::AllFeatures { element } => {
            let key: ElementKey = element.parse()?;
            let element = OsmApi::new(&config)?.element(key)?;
            print_json(&AllFeaturesReport {
                common_name: common_name(&element),
                features: matcher
                    .match_all(&element)
                    .iter()
                    .map(|feature| feature.name.clone())
                    .collect(),
            })
        }
        Commands::Stats => print_json(&catalog.stats()),
        Commands::File {
            change,
            changeset,
            context,
            user,
        } => describe_file(&config, &catalog, change, changeset, context, user),
    }
}
