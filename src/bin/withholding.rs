use mining_mdp::withholding::nash_equilibrium;

const SHARES: [f64; 5] = [0.1, 0.2, 0.3, 0.4, 0.5];

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("a,b,x,y,pool_0,pool_1,iterations,converged");
    for a in SHARES {
        for b in SHARES.into_iter().filter(|b| a + b <= 1.0) {
            let eq = nash_equilibrium(a, b)?;
            println!(
                "{:.2},{:.2},{:.6},{:.6},{:.6},{:.6},{},{}",
                a, b, eq.x, eq.y, eq.pool_0, eq.pool_1, eq.iterations,
                eq.converged
            );
        }
    }

    Ok(())
}
