use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};

use crate::{
    algorithm::Algorithm,
    config::Settings,
    packet::AlgorithmStatus,
    paper_algorithm::PaperAlgorithm,
    pipeline::Pipeline,
    publisher::holdings_by_symbol,
};

/// Drives the paper algorithm on the tokio runtime while a dedicated thread dispatches
/// results. Returns after shutdown (signal or `run_for` elapsed) once the final result
/// has been persisted.
pub async fn run(
    settings: &Settings,
    pipeline: Arc<Pipeline>,
    algo: Arc<PaperAlgorithm>,
    run_for: Option<Duration>,
) -> Result<()> {
    let algorithm_id = settings.deploy_id.clone();
    pipeline.set_algorithm(algo.clone());
    pipeline.send_status_update(&algorithm_id, AlgorithmStatus::Running, "");

    let dispatcher = {
        let p = pipeline.clone();
        std::thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || p.run())
            .context("spawn dispatcher")?
    };

    let mut loop_tick = tokio::time::interval(Duration::from_millis(settings.loop_ms));
    loop_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut equity_tick = tokio::time::interval(Duration::from_secs(1));
    equity_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let deadline = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut last_equity = settings.starting_cash;
    let mut day: Option<(NaiveDate, f64)> = None;
    let mut fills: u64 = 0;

    loop {
        tokio::select! {
            _ = loop_tick.tick() => {
                let now = Utc::now();
                let report = algo.step(now);
                for (symbol, price) in &report.prices {
                    pipeline.sample_asset_price(symbol, now, *price);
                }
                for fill in report.fills {
                    fills += 1;
                    pipeline.log_message(&format!(
                        "Filled order {} {} {:.6} @ {:.2}",
                        fill.order_id, fill.symbol, fill.fill_quantity, fill.fill_price
                    ));
                    pipeline.order_event(fill);
                }
                last_equity = report.equity;
            }
            _ = equity_tick.tick() => {
                let now = Utc::now();
                pipeline.sample_equity(now, last_equity);

                // Daily performance bar lands when the UTC date rolls over.
                let today = now.date_naive();
                match day {
                    Some((d, open)) if d != today => {
                        let pct = if open > 0.0 { (last_equity / open - 1.0) * 100.0 } else { 0.0 };
                        pipeline.sample_performance(now, pct);
                        day = Some((today, last_equity));
                    }
                    None => day = Some((today, last_equity)),
                    _ => {}
                }

                pipeline.runtime_statistic("Fills", &fills.to_string());
                pipeline.debug_message(&format!("heartbeat equity={last_equity:.2}"));
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    pipeline.runtime_error(&format!("signal handler failed: {e}"), "");
                }
                log::info!("app.shutdown reason=signal");
                break;
            }
            _ = &mut deadline => {
                log::info!("app.shutdown reason=deadline");
                break;
            }
        }
    }

    pipeline.send_status_update(&algorithm_id, AlgorithmStatus::Stopped, "");
    pipeline.exit();

    let p = pipeline.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        dispatcher
            .join()
            .map_err(|_| anyhow!("dispatcher thread panicked"))??;

        let portfolio = algo.portfolio();
        p.send_final_result(
            p.job(),
            algo.orders(),
            algo.profit_loss(),
            holdings_by_symbol(&portfolio),
            algo.statistics(),
            p.statistics().banner(&portfolio),
        );
        Ok(())
    })
    .await
    .context("join shutdown task")??;

    log::info!("app.stop deploy_id={}", settings.deploy_id);
    Ok(())
}
