/*!
Control the appearance of evaluation result data

# Working with [`ResultsBuilder`]

## Examples

Creating a [`ResultsTable`] after running an evaluation:

```
use mining_mdp::prelude::*;

let evaluation = EvaluationBuilder::new()
    .protocol(ProtocolKind::Utb)
    .policy(Selfish::bounded(20))
    .utb_ratios([0.0, 0.5, 1.0])
    .episodes(5)
    .max_steps(500)
    .build()
    .unwrap();

let results = evaluation
    .run_all()
    .average(Average::Median) // Median over the episodes of each point
    .policy_name()            // Include the name of the evaluated policy
    .format(Format::CSV)      // Output results as CSV
    .build();

println!("{}", results);
```

# Columns

Every table contains the protocol, `alpha`, `gamma`, the averaged reward
fraction and its standard deviation, the honest baseline (the reward fraction
of an honest miner, which equals `alpha`) and the excess over that baseline.
Tables for the UTB protocol also contain the UTB ratio. CSV headers use
snake case, e.g. `mean_reward_fraction`.
*/

use std::{collections::BTreeSet, fmt::Display};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    action::Action,
    evaluation::PointOutput,
    protocol::ProtocolKind,
    utils::{mean, median_of_floats, std_dev, wrap, WrapFunc},
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ResultsTable`]. Typically produced by running an
/// [`Evaluation`](crate::evaluation::Evaluation).
#[derive(Debug, Clone)]
pub struct ResultsBuilder {
    average: Average,
    columns: BTreeSet<Column>,
    data: Vec<PointOutput>,
    format: Format,
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

impl ResultsBuilder {
    /// Create a new [`ResultsBuilder`].
    pub(crate) fn new(data: Vec<PointOutput>) -> Self {
        Self {
            data,
            average: Average::default(),
            columns: BTreeSet::default(),
            format: Format::default(),
        }
    }

    /// Include the policy name, episode reward, action share, episode and
    /// step count columns.
    pub fn all(self) -> Self {
        self.policy_name()
            .episode_reward()
            .action_shares()
            .episodes()
            .steps()
    }

    /// Average the per-episode values of each parameter point with the given
    /// [`Average`] method (default [`Average::Mean`]).
    pub fn average(mut self, average: Average) -> Self {
        self.average = average;

        self
    }

    /// Include a column for the share of steps spent on each action.
    pub fn action_shares(mut self) -> Self {
        for action in Action::ALL {
            self.columns.insert(Column::ActionShare(action));
        }

        self
    }

    /// Extract the raw [`PointOutput`] data from this [`ResultsBuilder`].
    /// Useful for running custom statistical analysis.
    ///
    /// # Ordering
    /// Parameter points follow the order of the swept alphas, then gammas,
    /// then UTB ratios.
    pub fn data(self) -> Vec<PointOutput> {
        self.data
    }

    /// Include the averaged total attacker reward of an episode.
    pub fn episode_reward(mut self) -> Self {
        self.columns.insert(Column::EpisodeReward);

        self
    }

    /// Include the number of episodes per parameter point.
    pub fn episodes(mut self) -> Self {
        self.columns.insert(Column::Episodes);

        self
    }

    /// Include the name of the evaluated policy.
    pub fn policy_name(mut self) -> Self {
        self.columns.insert(Column::PolicyName);

        self
    }

    /// Include the number of steps per episode.
    pub fn steps(mut self) -> Self {
        self.columns.insert(Column::Steps);

        self
    }

    /// Use the `alpha` of each parameter point as input to `func`, and
    /// present the output in a table column with the given title.
    ///
    /// See [`selfish_revenue_curve`](crate::theory::selfish_revenue_curve).
    pub fn theoretical<T, F>(mut self, title: T, func: F) -> Self
    where
        T: Into<String>,
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.columns.insert(Column::AlphaFunction(wrap!(title, func)));

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { average, mut columns, data, format } = self;

        columns.extend([
            Column::Protocol,
            Column::Alpha,
            Column::Gamma,
            Column::RewardFraction,
            Column::StdRewardFraction,
            Column::HonestBaseline,
            Column::ExcessReward,
        ]);
        if data.iter().any(|output| output.protocol == ProtocolKind::Utb) {
            columns.insert(Column::UtbRatio);
        }

        let columns = Vec::from_iter(columns);
        let row = |output: &PointOutput| -> Vec<ColumnValue> {
            columns
                .iter()
                .map(|col_type| col_type.get_value(average, output))
                .collect()
        };

        #[cfg(feature = "rayon")]
        let rows = data.par_iter().map(row).collect();
        #[cfg(not(feature = "rayon"))]
        let rows = data.iter().map(row).collect();

        ResultsTable { average, columns, format, rows }
    }
}

/// Formatted results from the completion of an
/// [`Evaluation`](crate::evaluation::Evaluation). The results table
/// is given by the struct's [`Display`] implementation, as specified by
/// its [`Format`].
pub struct ResultsTable {
    average: Average,
    columns: Vec<Column>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column titles, in table order.
    pub fn titles(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.title(self.average)).collect()
    }

    /// The numeric value in row `row` of the column titled `title`.
    pub fn float(&self, row: usize, title: &str) -> Option<f64> {
        let col = self.titles().iter().position(|t| t == title)?;

        match self.rows.get(row)?.get(col)? {
            ColumnValue::Float(value) => Some(*value),
            ColumnValue::Int(value) => Some(*value as f64),
            ColumnValue::Text(_) => None,
        }
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let titles = self.titles();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.into_iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Methods of extracting an average/central value from the episodes of a
/// parameter point.
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Average {
    /// Arithmetic mean of all values.
    #[default]
    Mean,
    /// Median of all values.
    Median,
    /// Maximum of all values.
    Max,
    /// Minimum of all values.
    Min,
}

impl Average {
    fn apply(&self, values: Vec<f64>) -> f64 {
        let avg = match self {
            Self::Mean => mean(&values),
            Self::Median => median_of_floats(values),
            Self::Max => values.into_iter().reduce(f64::max),
            Self::Min => values.into_iter().reduce(f64::min),
        };

        avg.unwrap_or(f64::NAN)
    }

    fn prefix(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// Type of column that can appear in a data table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables:
    // https://doc.rust-lang.org/stable/std/cmp/trait.PartialOrd.html#derivable
    Protocol,
    PolicyName,
    Alpha,
    Gamma,
    UtbRatio,
    RewardFraction,
    StdRewardFraction,
    HonestBaseline,
    ExcessReward,
    AlphaFunction(WrapFunc<f64, f64>),
    EpisodeReward,
    ActionShare(Action),
    Episodes,
    Steps,
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone)]
enum ColumnValue {
    Text(String),
    Float(f64),
    Int(usize),
}

#[inline]
fn reward_fractions(output: &PointOutput) -> Vec<f64> {
    output.episodes.iter().map(|e| e.reward_fraction).collect()
}

impl Column {
    fn get_value(&self, average: Average, output: &PointOutput) -> ColumnValue {
        use ColumnValue::*;

        match &self {
            Self::Protocol => Text(output.protocol.to_string()),
            Self::PolicyName => Text(output.policy.clone()),
            Self::Alpha | Self::HonestBaseline => Float(output.point.alpha),
            Self::Gamma => Float(output.point.gamma),
            Self::UtbRatio => match output.protocol {
                ProtocolKind::Utb => Float(output.point.utb_ratio),
                _ => Text(String::new()),
            },
            Self::RewardFraction => {
                Float(average.apply(reward_fractions(output)))
            }
            Self::StdRewardFraction => Float(
                std_dev(&reward_fractions(output)).unwrap_or(f64::NAN),
            ),
            Self::ExcessReward => {
                let fraction = average.apply(reward_fractions(output));

                Float(fraction - output.point.alpha)
            }
            Self::AlphaFunction(func) => Float(func.call(output.point.alpha)),
            Self::EpisodeReward => {
                let rewards =
                    output.episodes.iter().map(|e| e.episode_reward).collect();

                Float(average.apply(rewards))
            }
            Self::ActionShare(action) => {
                let i = Action::ALL
                    .iter()
                    .position(|a| a == action)
                    .unwrap_or_default();
                let (taken, total) = output.episodes.iter().fold(
                    (0, 0),
                    |(taken, total), e| {
                        (
                            taken + e.action_counts[i],
                            total + e.action_counts.iter().sum::<u64>(),
                        )
                    },
                );

                Float(taken as f64 / total.max(1) as f64)
            }
            Self::Episodes => Int(output.episodes.len()),
            Self::Steps => Int(output.max_steps),
        }
    }

    fn title(&self, average: Average) -> String {
        match &self {
            Self::Protocol => "protocol".into(),
            Self::PolicyName => "policy".into(),
            Self::Alpha => "alpha".into(),
            Self::Gamma => "gamma".into(),
            Self::UtbRatio => "utb_ratio".into(),
            Self::RewardFraction => {
                format!("{}_reward_fraction", average.prefix())
            }
            Self::StdRewardFraction => "std_reward_fraction".into(),
            Self::HonestBaseline => "honest_baseline".into(),
            Self::ExcessReward => "excess_reward".into(),
            Self::AlphaFunction(func) => func.name().into(),
            Self::EpisodeReward => {
                format!("{}_episode_reward", average.prefix())
            }
            Self::ActionShare(action) => format!("{}_share", action),
            Self::Episodes => "episodes".into(),
            Self::Steps => "steps".into(),
        }
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Float(value) => {
                write!(f, "{:.1$}", value, FLOAT_PRECISION_DIGITS)
            }
            Self::Int(value) => write!(f, "{}", value),
        }
    }
}
