use crate::config::{AppConfig, Detail};
use crate::report::{self, Statistics};
use crate::tally::{tally, DistrictIndex};
use crate::{data, fetch, nodes, render};
use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the download and use the cache as-is.
    pub offline: bool,
    pub skip_plots: bool,
}

/// load districts -> fetch -> extract -> tally -> dump -> plot
pub async fn run(config: &AppConfig, options: RunOptions) -> Result<Statistics> {
    let districts = data::load_districts(&config.districts)?;

    if options.offline {
        info!("Offline run, using cached nodes at {:?}", config.nodes.cache_path);
    } else {
        fetch::refresh_or_fallback(&config.nodes).await;
    }

    let extraction = nodes::load_nodes(&config.nodes.cache_path)?;

    let index = DistrictIndex::new(&districts);
    let known = tally(&index, extraction.known.values());

    let stats = match config.output.detail {
        Detail::Plain => {
            info!("{} located nodes within district boundaries", known.within_boundary());
            Statistics::plain(&extraction, &known)
        }
        Detail::Split => {
            let online = tally(&index, extraction.online.iter().flat_map(|coords| coords.values()));
            info!(
                "{} known / {} online nodes within district boundaries",
                known.within_boundary(),
                online.within_boundary()
            );
            Statistics::split(&extraction, &online, &known, Utc::now())
        }
    };

    report::write_statistics(&stats, config.output.statistics.as_deref())?;

    if options.skip_plots {
        return Ok(stats);
    }

    match &config.output.map {
        Some(path) => {
            if let Err(e) = render::render_map(&config.map, &districts, extraction.known.values(), path) {
                warn!("Map rendering failed: {:#}", e);
            }
        }
        None => info!("No map output path configured, skipping map"),
    }

    if let Statistics::Split { districts: split, .. } = &stats {
        match &config.output.bar_chart {
            Some(path) => {
                if let Err(e) = render::render_bar_chart(&config.map, &split.online, path) {
                    warn!("Bar chart rendering failed: {:#}", e);
                }
            }
            None => info!("No bar chart output path configured, skipping bar chart"),
        }
    }

    Ok(stats)
}
