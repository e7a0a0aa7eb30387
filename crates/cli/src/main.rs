//! Prints the XML representation of a stored conditions payload.
//!
//! The area layout comes from the environment of a set-up developer area
//! (`CMSSW_BASE`, `CMSSW_RELEASE_BASE`, `SCRAM_ARCH`), optionally overlaid by a TOML file.
//! Outside a set-up area the TOML file given with `--config` supplies the whole layout.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use condxml_converter::{Config, Payload2Xml, PayloadFetcher, PayloadTable};
use tracing::{debug, info};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cond2xml")]
#[command(about = "Convert a stored conditions payload to XML")]
struct Args {
	/// Hash of the payload to convert
	hash: String,

	/// TOML file overriding the area layout and build settings
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// JSON manifest listing the available payloads
	#[arg(short, long, value_name = "FILE", default_value = "payloads.json")]
	manifest: PathBuf,

	/// Remove a staging directory left behind by an earlier failed build first
	#[arg(long)]
	discard_stale_staging: bool,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let config = Config::from_env_and_file(args.config.as_deref()).context("configuring the area layout")?;
	config.validate()?;
	debug!(base = %config.base_dir.display(), arch = %config.arch, "Area configured");

	let table = PayloadTable::from_manifest(&args.manifest).with_context(|| format!("loading payload manifest {}", args.manifest.display()))?;
	info!(payloads = table.len(), "Payload manifest loaded");

	let converter = Payload2Xml::new(config);
	if args.discard_stale_staging {
		let payload = table.fetch_by_key(&args.hash)?;
		converter.discard_stale_staging(&payload.object_type)?;
	}

	let xml = converter.convert_to_xml(&table, &args.hash)?;
	println!("{xml}");
	Ok(())
}
