use std::time::Instant;

use anyhow::Context;
use log::info;
use mining_mdp::prelude::*;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let start = Instant::now();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::from_json_file(&path)
            .with_context(|| format!("could not load settings from {}", path))?,
        None => Settings {
            evaluation: EvaluationSettings {
                alphas: (1..10).map(|n| n as f64 / 20.0).collect(),
                episodes: 10,
                ..Default::default()
            },
            ..Default::default()
        },
    };
    info!("running with {:?}", settings);

    let gamma = settings.environment.gamma;
    let evaluation = EvaluationBuilder::from_settings(&settings)
        .policy(Selfish::bounded(settings.environment.max_hidden_block))
        .build()?;

    let mut results = evaluation.run_all().policy_name().action_shares();
    if settings.evaluation.gammas.is_empty() {
        results = results
            .theoretical("selfish_revenue", selfish_revenue_curve(gamma));
    }

    println!("{}", results.format(Format::CSV).build());
    info!("elapsed time: {:.4} secs", start.elapsed().as_secs_f64());

    Ok(())
}
