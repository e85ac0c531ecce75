// Copyright (C) 2022 Electronic Arts, Inc. All rights reserved.

//! Read-only access to Helm charts stored in ECR
#![warn(missing_docs)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::use_self)]
#![allow(clippy::missing_errors_doc)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use clap::Subcommand;
use tap::Pipe;
use tracing::{debug, error, warn};

mod charts;
use charts::error::ServiceError;
use charts::{ChartService, EcrChartService, with_deadline};

mod config;
use config::{Config, FileConfig, Overrides};

mod logging;
use logging::LogFormat;

mod output;
use output::OutputFormat;

mod registry;
use registry::RegistryClient;
use registry::ecr::{EcrRegistry, StsIdentity};

#[derive(Subcommand, Debug, Clone)]
enum Request {
    /// List the allowed chart repositories that exist in the registry.
    List,

    /// Show the images of a chart.
    Describe {
        /// Repository holding the chart.
        repository: String,

        #[clap(long)]
        tag: Option<String>,

        #[clap(long)]
        digest: Option<String>,
    },

    /// Print one file from a packaged chart.
    GetFile {
        /// Repository holding the chart.
        repository: String,

        /// File to look for, matched against the end of each archive path.
        file_name: String,

        #[clap(long)]
        tag: Option<String>,

        #[clap(long)]
        digest: Option<String>,

        /// Write the file here instead of stdout.
        #[clap(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = "Read-only access to Helm charts stored in ECR")]
struct Args {
    #[clap(subcommand)]
    command: Request,

    /// Repositories that may be queried, comma separated.
    #[clap(long, env = "HELM_REPOSITORIES", value_delimiter = ',')]
    repositories: Vec<String>,

    /// YAML config file.
    #[clap(long)]
    config: Option<PathBuf>,

    /// AWS region of the registry.
    #[clap(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Give up on a request after this many seconds.
    #[clap(long)]
    timeout: Option<u64>,

    #[clap(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

fn load_config(args: &Args) -> Result<Config> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let overrides = Overrides {
        repositories: args.repositories.clone(),
        region: args.region.clone(),
        timeout_secs: args.timeout,
    };

    Config::resolve(file, overrides).pipe(Ok)
}

async fn build_service(config: &Config) -> Result<EcrChartService> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let region = sdk_config
        .region()
        .ok_or_else(|| anyhow!("No AWS region configured, use --region or AWS_REGION"))?
        .to_string();

    let api = EcrRegistry::new(&sdk_config).context("Cannot create registry client")?;
    let identity = StsIdentity::new(&sdk_config);

    EcrChartService::new(
        config.allow_list.clone(),
        Arc::new(identity),
        RegistryClient::new(Arc::new(api), region),
    )
    .pipe(Ok)
}

fn write_file(out: Option<&PathBuf>, contents: &[u8]) -> Result<()> {
    if let Some(path) = out {
        return std::fs::write(path, contents)
            .with_context(|| format!("Writing file {}", path.display()));
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(contents).context("Writing to stdout")?;
    stdout.flush().context("Writing to stdout")
}

async fn do_request(
    service: &dyn ChartService,
    command: &Request,
    format: OutputFormat,
) -> Result<Result<(), ServiceError>> {
    match command {
        Request::List => match service.list_charts().await {
            Ok(repositories) => {
                println!("{}", output::repositories(format, &repositories)?);
                Ok(Ok(()))
            }
            Err(err) => Ok(Err(err)),
        },
        Request::Describe {
            repository,
            tag,
            digest,
        } => match service
            .describe_chart(repository, tag.as_deref(), digest.as_deref())
            .await
        {
            Ok(images) => {
                println!("{}", output::images(format, &images)?);
                Ok(Ok(()))
            }
            Err(err) => Ok(Err(err)),
        },
        Request::GetFile {
            repository,
            file_name,
            tag,
            digest,
            out,
        } => match service
            .get_chart_file(repository, tag.as_deref(), digest.as_deref(), file_name)
            .await
        {
            Ok(file) => {
                debug!(
                    path = %file.path,
                    content_type = charts::archive::content_type(file_name),
                    size = file.contents.len(),
                    "writing chart file"
                );
                write_file(out.as_ref(), &file.contents)?;
                Ok(Ok(()))
            }
            Err(err) => Ok(Err(err)),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        return Err(anyhow::anyhow!(
            "Failed to install rustls crypto provider: {err:?}"
        ));
    }

    let args = Args::parse();
    logging::init(args.log_format, "info")?;

    let config = load_config(&args)?;
    if config.allow_list.is_empty() {
        warn!("no repositories are allowed, every chart request will be rejected");
    }

    let service = build_service(&config).await?;

    let rc = with_deadline(config.timeout, async {
        match do_request(&service, &args.command, args.output).await {
            Ok(result) => result.map(|()| Ok(())),
            Err(err) => Ok(Err(err)),
        }
    })
    .await;

    match rc {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(err) => std::process::exit(report_failure(&err)),
    }
}

/// Log a failed request and pick the process exit code for it.
fn report_failure(err: &ServiceError) -> i32 {
    let kind = err.kind();
    error!(
        error = %err,
        kind = ?kind,
        retryable = kind.is_retryable(),
        "request failed"
    );
    kind.exit_code()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_args() {
        Args::command().debug_assert();
    }

    #[test]
    fn failure_exit_codes() {
        let upstream = ServiceError::UpstreamFailure("deadline exceeded after 1s".to_string());
        assert!(upstream.kind().is_retryable());
        assert_eq!(report_failure(&upstream), 5);

        let missing = ServiceError::FileNotFound("'values.yaml' not found".to_string());
        assert!(!missing.kind().is_retryable());
        assert_eq!(report_failure(&missing), 4);

        let denied = ServiceError::NotAllowed("charts/secret".to_string());
        assert_eq!(report_failure(&denied), 3);
    }
}
