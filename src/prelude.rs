/*!
Re-export of common values and datatypes used for building environments and
running evaluations. Must be imported manually.

```
use mining_mdp::prelude::*;
```
*/

use crate::{
    action, analysis, config, env, evaluation, policy, protocol, results,
    reward, state, theory, transition, withholding,
};

pub use action::{legal_actions, Action, ActionSpace};

pub use analysis::{
    evaluate_policy, solve_optimal, AnalysisError, OptimalPolicy,
    PolicyEvaluation, SolverOptions,
};

pub use config::{
    ConfigLoadError, ConfigurationError, EvaluationSettings, ObservationKind,
    ProtocolConfig, RandomProcess, Settings,
};

pub use env::{
    make_env, EnvBuilder, Environment, MiningEnv, Observation,
    ObservationSpace, Step, StepInfo, TimeLimit, UtbInfo,
};

pub use evaluation::{
    Evaluation, EvaluationBuildError, EvaluationBuilder, ParameterPoint,
    PointOutput,
};

pub use policy::{Honest, Policy, RandomPolicy, Selfish, TablePolicy};

pub use protocol::{ChainRule, Protocol, ProtocolKind};

pub use results::{Average, Format, ResultsBuilder, ResultsTable};

pub use reward::{Reward, RewardTracker};

pub use state::{Fork, Party, State, StateSpace};

pub use theory::{
    profitability_threshold, rational_revenue, selfish_revenue,
    selfish_revenue_curve,
};

pub use transition::{Transition, TransitionModel};

pub use withholding::{
    nash_equilibrium, DiscreteWithholdingEnv, Equilibrium, OpponentStrategy,
    WithholdingEnv,
};
