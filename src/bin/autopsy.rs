//! Reconstructs a past launch from its mint address and prints the verdict.
//!
//! Usage: `autopsy <MINT> [--json]`

use anyhow::{bail, Context, Result};
use colored::Colorize;
use launchguard::chain::RpcChainSource;
use launchguard::config::Settings;
use launchguard::logging::init_console_tracing;
use launchguard_core::rate_limit::RequestPacer;
use launchguard_scout::{AutopsyReport, AutopsyVerdict, BundleClassifier, FundingTracer, LaunchAutopsy};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

fn print_report(report: &AutopsyReport, cluster_threshold: u32) {
    println!("\n{}", "🔬 LAUNCH AUTOPSY".bold());
    println!("{}", "=".repeat(60));
    println!("🪙 Mint:          {}", report.mint.bold());
    println!("📅 Creation slot: {}", report.creation_slot);
    println!("👥 Block-0 buyers: {}", report.bundle_size());

    let tip = if report.tip_account_hit {
        "YES".red().bold()
    } else {
        "no".green()
    };
    println!("💸 Jito tip:      {}", tip);

    match &report.funding {
        Some(funding) => {
            println!(
                "🕸️  Funding:       {}/{} traced",
                funding.resolved_count(),
                funding.traces.len()
            );
            if let Some(funder) = report.common_funder() {
                let count = format!("x{}", report.cluster_size());
                let count = if report.cluster_size() > cluster_threshold {
                    count.red().bold()
                } else {
                    count.yellow()
                };
                println!("   Top funder:    {} {}", funder, count);
            }
        }
        None => println!("🕸️  Funding:       not traced (too few buyers)"),
    }

    println!("{}", "-".repeat(60));
    let verdict = report.verdict.to_string();
    let verdict = match report.verdict {
        AutopsyVerdict::FarmCritical => verdict.red().bold(),
        AutopsyVerdict::FarmHigh => verdict.yellow().bold(),
        AutopsyVerdict::Organic => verdict.green().bold(),
    };
    println!("⚖️  Verdict:       {}", verdict);
    if report.detected {
        println!("{}", "🚨 Launch integrity compromised".red());
    }

    if !report.buyers.is_empty() {
        println!("\n{}", "Block-0 buyers:".bold());
        for (i, buyer) in report.buyers.iter().enumerate() {
            println!("   {:>3}. {}", i + 1, buyer);
        }
    }
    println!("\n   🟪 https://solscan.io/token/{}", report.mint);
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut mint = None;
    let mut json = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                println!("Usage: autopsy <MINT> [--json]");
                return Ok(());
            }
            other if mint.is_none() => mint = Some(other.to_string()),
            other => bail!("unexpected argument: {other}"),
        }
    }
    let Some(mint) = mint else {
        bail!("Usage: autopsy <MINT> [--json]");
    };
    Pubkey::from_str(&mint).with_context(|| format!("invalid mint address: {mint}"))?;

    let settings = Settings::load().context("failed to load configuration")?;
    init_console_tracing("warn");

    let pacer = Arc::new(RequestPacer::new(
        settings.rpc.request_spacing(),
        settings.rpc.burst,
    ));
    let chain = RpcChainSource::new(
        settings.rpc.http_url.clone(),
        settings.rpc.commitment_config()?,
        settings.rpc.timeout(),
        pacer,
    );

    let cluster_threshold = settings.funding.cluster_threshold;
    let autopsy = LaunchAutopsy::new(
        settings.autopsy.clone(),
        BundleClassifier::new(&settings.bundle),
        FundingTracer::new(settings.funding.clone()),
    );

    if !json {
        println!("🔍 Reconstructing launch of {} ...", mint.bold());
    }
    let report = autopsy
        .run(&chain, &mint)
        .await
        .with_context(|| format!("autopsy of {mint} failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, cluster_threshold);
    }
    Ok(())
}
