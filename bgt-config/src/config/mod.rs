//! Configuration for bgt-server, read from a TOML file, environment variables and the command line.
//!

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Command, FromArgMatches, Parser};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing::subscriber::set_global_default;
use tracing_subscriber::fmt::{format, layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::FormattingStyle::{Compact, Full, Json, Pretty};
use crate::config::collection::CollectionConfig;
use crate::config::limits::Limits;
use crate::config::server::ServerConfig;
use crate::error::Error::{ArgParseError, IoError, TracingError};
use crate::error::Result;

pub mod collection;
pub mod limits;
pub mod server;

/// Represents a usage string for bgt-server.
pub const USAGE: &str = "Serve genotype queries over one or more BGT panels. \
Panels are given as file prefixes; each prefix is read from <prefix>.vcf.gz or <prefix>.vcf, with \
optional sample annotations in <prefix>.spl. Options may also be set in a config file or with \
BGT_ prefixed environment variables.";

const ENVIRONMENT_VARIABLE_PREFIX: &str = "BGT_";

/// The command line arguments allowed for the bgt-server executable.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = USAGE)]
struct Args {
  #[arg(
    short,
    long,
    env = "BGT_CONFIG",
    help = "Set the location of the config file"
  )]
  config: Option<PathBuf>,
  #[arg(long, exclusive = true, help = "Print a default config file")]
  print_default_config: bool,
  #[arg(short, long, env = "PORT", help = "Port to listen on")]
  port: Option<u16>,
  #[arg(
    short = 'm',
    long,
    help = "Maximum number of genotypes processed by a single request"
  )]
  max_genotypes: Option<u64>,
  #[arg(short = 'd', long, help = "Variant annotations in FMF format")]
  variant_annotations: Option<PathBuf>,
  #[arg(
    short = 'g',
    long,
    help = "Minimal sample group size, suppresses genotype output if positive"
  )]
  min_group_size: Option<usize>,
  #[arg(help = "BGT file prefixes")]
  prefixes: Vec<PathBuf>,
}

/// Determines which tracing formatting style to use.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum FormattingStyle {
  #[default]
  Full,
  Compact,
  Pretty,
  Json,
}

/// Configuration for bgt-server.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
  formatting_style: FormattingStyle,
  server: ServerConfig,
  collection: CollectionConfig,
  limits: Limits,
}

impl Config {
  /// Create a new config.
  pub fn new(
    formatting_style: FormattingStyle,
    server: ServerConfig,
    collection: CollectionConfig,
    limits: Limits,
  ) -> Self {
    Self {
      formatting_style,
      server,
      collection,
      limits,
    }
  }

  /// Parse the command line arguments, augmenting the `Command` from the `clap` parser. Returns
  /// the config, or `None` if the default config was printed instead.
  pub fn parse_args_with_command(augment_args: Command) -> Result<Option<Self>> {
    Self::parse_with_args(
      Args::from_arg_matches(&Args::augment_args(augment_args).get_matches())
        .map_err(|err| ArgParseError(err.to_string()))?,
    )
  }

  fn parse_with_args(args: Args) -> Result<Option<Self>> {
    if args.print_default_config {
      println!("{}", toml::ser::to_string_pretty(&Config::default())?);
      return Ok(None);
    }

    let path = args.config.clone().unwrap_or_else(|| "".into());
    let config = Self::from_path(&path)?.with_args(args);
    config.validate()?;

    Ok(Some(config))
  }

  /// Read a config struct from a TOML file, merging environment variables over it.
  pub fn from_path(path: &Path) -> Result<Self> {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
      .merge(Toml::file(path))
      .merge(
        Env::prefixed(ENVIRONMENT_VARIABLE_PREFIX)
          .filter(|k| k != "config")
          .map(|k| {
            // Nested tables have to be listed explicitly, see
            // https://github.com/SergioBenitez/Figment/issues/12
            k.as_str()
              .to_lowercase()
              .replacen("server_", "server.", 1)
              .replacen("collection_", "collection.", 1)
              .replacen("limits_", "limits.", 1)
              .into()
          }),
      )
      .extract()
      .map_err(|err| IoError(format!("failed to parse config: {err}")))?;

    info!(config = ?config, "config created");

    Ok(config)
  }

  /// Command line arguments take precedence over the file and environment.
  fn with_args(mut self, args: Args) -> Self {
    if let Some(port) = args.port {
      self.server.set_port(port);
    }
    if let Some(max_genotypes) = args.max_genotypes {
      self.limits = self.limits.with_max_genotypes(max_genotypes);
    }
    if let Some(min_group_size) = args.min_group_size {
      self.limits = self.limits.with_min_group_size(min_group_size);
    }
    if let Some(path) = args.variant_annotations {
      self.collection.set_variant_annotations(path);
    }
    if !args.prefixes.is_empty() {
      self.collection.set_files(args.prefixes);
    }

    self
  }

  /// Check that the config describes a servable collection.
  pub fn validate(&self) -> Result<()> {
    if self.collection.files().is_empty() {
      return Err(ArgParseError(
        "at least one BGT file prefix is required".to_string(),
      ));
    }

    Ok(())
  }

  /// Setup tracing, using a global subscriber.
  pub fn setup_tracing(&self) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default().with(env_filter);

    match self.formatting_style() {
      Full => set_global_default(subscriber.with(layer())),
      Compact => set_global_default(subscriber.with(layer().event_format(format().compact()))),
      Pretty => set_global_default(subscriber.with(layer().event_format(format().pretty()))),
      Json => set_global_default(subscriber.with(layer().event_format(format().json()))),
    }
    .map_err(|err| TracingError(err.to_string()))?;

    Ok(())
  }

  /// Get the formatting style.
  pub fn formatting_style(&self) -> FormattingStyle {
    self.formatting_style
  }

  /// Get the server config.
  pub fn server(&self) -> &ServerConfig {
    &self.server
  }

  /// Get the collection config.
  pub fn collection(&self) -> &CollectionConfig {
    &self.collection
  }

  /// Get the limits.
  pub fn limits(&self) -> Limits {
    self.limits
  }
}
