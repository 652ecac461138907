use crate::app_state::AppState;
use crate::pipeline::{Pipeline, ReportOutcome, SiteResult};
use crate::wiki_site;
use anyhow::{anyhow, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Identifiers, sitelinks, per-site reports, global report
    #[default]
    Start,
    Qids,
    Sitelinks,
    BySite,
    All,
    Diagnose,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "start" => Some(Self::Start),
            "qids" => Some(Self::Qids),
            "sitelinks" => Some(Self::Sitelinks),
            "by_site" => Some(Self::BySite),
            "all" => Some(Self::All),
            "diagnose" => Some(Self::Diagnose),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub command: Command,
    /// `site:<code>`
    pub site: Option<String>,
    /// `dump`: print computed data instead of publishing
    pub dump: bool,
    /// `nolocal`: ignore cached editor counts
    pub nolocal: bool,
}

impl RunOptions {
    /// Flags may appear anywhere; the first other argument is the command.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut ret = Self::default();
        let mut command = None;
        for arg in args {
            if let Some(site) = arg.strip_prefix("site:") {
                let site = site.trim();
                if site.is_empty() {
                    return Err(anyhow!("Empty site in '{arg}'"));
                }
                ret.site = Some(wiki_site::site_code(site));
                continue;
            }
            match arg.as_str() {
                "dump" => ret.dump = true,
                "nolocal" => ret.nolocal = true,
                other => match (command, Command::from_arg(other)) {
                    (None, Some(c)) => command = Some(c),
                    (Some(_), Some(_)) => return Err(anyhow!("More than one command: '{other}'")),
                    (_, None) => return Err(anyhow!("Unknown argument '{other}'")),
                },
            }
        }
        ret.command = command.unwrap_or_default();
        Ok(ret)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_args(std::env::args().skip(1))
    }
}

async fn build_pipeline(app_state: &AppState, options: &RunOptions) -> Result<Pipeline> {
    let counter = app_state.editor_counter(options.nolocal)?;
    let publisher = if options.dump {
        None
    } else {
        Some(app_state.publisher().await?)
    };
    Ok(Pipeline::new(
        app_state.config(),
        app_state.store(),
        counter,
        publisher,
    ))
}

/// Refreshes the item IDs from the home wiki. If that fails, the stored
/// list from an earlier run is used instead.
async fn run_qids(app_state: &AppState) -> Result<Vec<String>> {
    let source = app_state.identifier_source();
    match source.fetch().await {
        Ok(qids) => {
            info!("{} item IDs", qids.len());
            Ok(qids)
        }
        Err(e) => {
            warn!("Cannot fetch item IDs, using stored list: {e}");
            source.load().await
        }
    }
}

/// An unreachable Wikidata API skips the step; the stored title lists stay.
async fn run_sitelinks(app_state: &AppState, qids: &[String]) -> Result<()> {
    if qids.is_empty() {
        warn!("No item IDs, nothing to resolve");
        return Ok(());
    }
    let resolver = match app_state.sitelink_resolver().await {
        Ok(resolver) => resolver,
        Err(e) => {
            warn!("Skipping sitelinks, using stored title lists: {e}");
            return Ok(());
        }
    };
    let sites = resolver.resolve_and_save(qids).await?;
    info!("{} sites with articles", sites.len());
    Ok(())
}

fn log_outcome(outcome: &ReportOutcome) {
    match outcome {
        ReportOutcome::NoEditors => info!("global report: no editors"),
        ReportOutcome::Dumped => info!("global report dumped"),
        ReportOutcome::Published(o) => info!("global report: {o:?}"),
    }
}

async fn run_by_site(pipeline: &Pipeline, options: &RunOptions) -> Result<Vec<SiteResult>> {
    let results = pipeline.work_in_all_sites(options.site.as_deref()).await?;
    if results.is_empty() {
        match &options.site {
            Some(site) => warn!("No cached articles for {}", wiki_site::wiki_id(site)),
            None => warn!("No cached sites"),
        }
    }
    Ok(results)
}

/// The whole run. Per-site and global reports go ahead on the cached data
/// even when the identifier or sitelink step fails.
async fn run_start(app_state: &AppState, options: &RunOptions) -> Result<Vec<SiteResult>> {
    let qids = run_qids(app_state).await?;
    run_sitelinks(app_state, &qids).await?;
    let pipeline = build_pipeline(app_state, options).await?;
    let results = run_by_site(&pipeline, options).await?;
    if options.site.is_none() {
        log_outcome(&pipeline.run_all_editors().await?);
    }
    Ok(results)
}

pub async fn run_command(app_state: &AppState, options: &RunOptions) -> Result<()> {
    info!("{options:?}");
    match options.command {
        Command::Qids => {
            run_qids(app_state).await?;
        }
        Command::Sitelinks => {
            let qids = app_state.identifier_source().load().await?;
            run_sitelinks(app_state, &qids).await?;
        }
        Command::BySite => {
            let pipeline = build_pipeline(app_state, options).await?;
            run_by_site(&pipeline, options).await?;
        }
        Command::All => {
            let pipeline = build_pipeline(app_state, options).await?;
            log_outcome(&pipeline.run_all_editors().await?);
        }
        Command::Diagnose => {
            let pipeline = build_pipeline(app_state, &RunOptions { dump: true, ..options.clone() })
                .await?;
            let diagnosis = pipeline.diagnose().await?;
            println!("{}", serde_json::to_string_pretty(&diagnosis)?);
        }
        Command::Start => {
            let results = run_start(app_state, options).await?;
            info!("{} per-site reports", results.len());
        }
    }
    Ok(())
}
