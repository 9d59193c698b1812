use linnyr_common::Value;

use crate::arena::Id;
use crate::expr::Expr;

pub type ActorId = Id<Actor>;
pub type ProcessId = Id<Process>;
pub type ProductId = Id<Product>;
pub type ClusterId = Id<Cluster>;
pub type LinkId = Id<Link>;
pub type ConstraintId = Id<Constraint>;
pub type DatasetId = Id<Dataset>;
pub type ChartId = Id<Chart>;
pub type ExperimentId = Id<Experiment>;

/// A link or constraint endpoint: a process or a product. Linny-R forbids
/// process-to-process links, but constraints may run between either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Process(ProcessId),
    Product(ProductId),
}

pub struct Actor {
    pub name: String,
    pub id: String,
    pub weight: Expr,
    /// Bit N set means this actor's processes are included in round N of
    /// the lexicographic objective.
    pub round_flags: u32,
}

pub struct Process {
    pub name: String,
    pub id: String,
    pub code: String,
    pub actor: ActorId,
    pub cluster: ClusterId,
    pub lower_bound: Expr,
    pub upper_bound: Expr,
    pub equal_bounds: bool,
    pub initial_level: Expr,
    /// Static integer ≥ 1: the process updates its level at most once every
    /// `pace` timesteps.
    pub pace: u32,
    pub integer_level: bool,
    pub semi_continuous: bool,
    /// Populated by the block scheduler; indexed by timestep within a run.
    pub level: Vec<f64>,
    /// Populated by the cost-price propagator once the run completes;
    /// `Value::Undefined` at any timestep where a negative level aborted
    /// that timestep's propagation.
    pub cost_price: Vec<Value>,
}

pub struct Product {
    pub name: String,
    pub id: String,
    pub code: String,
    pub scale_unit: String,
    pub lower_bound: Expr,
    pub upper_bound: Expr,
    pub initial_level: Expr,
    pub price: Expr,
    pub is_source: bool,
    pub is_sink: bool,
    pub is_buffer: bool,
    pub is_data: bool,
    pub no_slack: bool,
    pub no_links: bool,
    pub level: Vec<f64>,
    /// Populated by the cost-price propagator; see [`Process::cost_price`]
    /// for the sentinel convention.
    pub stock_price: Vec<Value>,
}

impl Product {
    /// Products named with a leading `$` are actor cash-flow data products
    /// and always carry the model currency unit regardless of what was
    /// requested.
    pub fn is_cash_flow_data(&self) -> bool {
        self.name.starts_with('$')
    }
}

/// A lightweight reference to a product placed at a position within a
/// cluster. Several positions across different clusters may name the same
/// product — ownership of the product itself stays with the model.
#[derive(Debug, Clone, Copy)]
pub struct ProductPosition {
    pub product: ProductId,
    pub x: f64,
    pub y: f64,
}

pub struct Cluster {
    pub name: String,
    pub id: String,
    pub actor: ActorId,
    pub parent: Option<ClusterId>,
    pub child_clusters: Vec<ClusterId>,
    pub child_processes: Vec<ProcessId>,
    pub product_positions: Vec<ProductPosition>,
    pub notes: String,
    pub ignore: bool,
    pub black_box: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMultiplier {
    Positive,
    Zero,
    StartUp,
    ShutDown,
    FirstCommit,
    SpinningReserve,
    PeakIncrease,
}

pub struct Link {
    pub id: String,
    pub from: NodeRef,
    pub to: NodeRef,
    pub relative_rate: Expr,
    pub flow_delay: Expr,
    pub multiplier: LinkMultiplier,
    pub share_of_cost: f64,
    pub is_feedback: bool,
    pub actual_flow: Vec<f64>,
    pub unit_cost_price: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    Le,
    Eq,
    Ge,
}

#[derive(Debug, Clone)]
pub struct BoundLine {
    pub bound_type: BoundType,
    /// `(x%, y%)` knot points, strictly monotone in x, both axes in
    /// `[0, 100]`.
    pub points: Vec<(f64, f64)>,
    /// Non-empty selector set restricts this line to combinations whose
    /// active selectors intersect it; an empty set means "always active".
    pub selectors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostShareDirection {
    FromToTo,
    ToToFrom,
}

pub struct Constraint {
    pub id: String,
    pub from: NodeRef,
    pub to: NodeRef,
    pub bound_lines: Vec<BoundLine>,
    pub no_slack: bool,
    pub share_of_cost: f64,
    pub soc_direction: CostShareDirection,
    pub transfer_cost_price: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMethod {
    Nearest,
    WeightedMean,
    WeightedSum,
    Max,
}

pub struct DatasetModifier {
    pub selector: String,
    pub expression: Expr,
}

pub struct Dataset {
    pub name: String,
    pub id: String,
    pub default_value: f64,
    pub scale_unit: String,
    /// Duration of one raw-data sample, in the dataset's own time unit.
    pub time_scale: f64,
    pub time_unit: String,
    pub interpolation: InterpolationMethod,
    pub periodic: bool,
    pub array: bool,
    pub raw_data: Vec<f64>,
    pub modifiers: Vec<DatasetModifier>,
}

pub struct ChartVariable {
    pub object: String,
    pub attribute: Option<String>,
    pub color: String,
    pub scale_factor: f64,
    pub line_width: f64,
    pub stacked: bool,
    pub sorted: bool,
    pub visible: bool,
    pub wildcard_index: Option<u32>,
}

pub struct Chart {
    pub title: String,
    pub bins: u32,
    pub histogram: bool,
    pub variables: Vec<ChartVariable>,
}

pub struct Experiment {
    pub title: String,
    /// Each dimension is a finite set of selector strings; dimensions must
    /// be pairwise disjoint (no selector repeated across dimensions).
    pub dimensions: Vec<Vec<String>>,
    pub charts: Vec<ChartId>,
    pub settings_selectors: Vec<String>,
    pub actor_selectors: Vec<String>,
    pub combination_selectors: Vec<String>,
    pub excluded_selectors: Vec<String>,
    pub clusters_to_ignore: Vec<String>,
    pub runs: Vec<ExperimentRun>,
}

#[derive(Debug, Clone)]
pub struct VariableStats {
    pub n: usize,
    pub sum: f64,
    pub mean: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub non_zero_tally: usize,
    pub exceptions: usize,
    pub last: f64,
}

#[derive(Debug, Clone)]
pub struct ExperimentRun {
    pub number: u32,
    pub wall_clock_start: f64,
    pub wall_clock_recorded: f64,
    pub time_step_count: u32,
    pub duration: f64,
    pub variable_stats: Vec<(String, VariableStats)>,
    pub variable_series: Vec<(String, Vec<f64>)>,
    pub solver_messages: Vec<(u32, String)>,
}
