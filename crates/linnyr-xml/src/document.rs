use linnyr_model::Model;

/// Top-level metadata that sits on the `<model>` root element itself, next
/// to the entity tree. None of this is core modeling data — it is the
/// document's own header (title, save timestamp, run-configuration
/// defaults, UI toggles) — so it lives beside a `Model` rather than inside
/// it.
pub struct ModelDocument {
    pub model: Model,

    pub name: String,
    pub author: String,
    pub notes: String,
    pub version: String,
    pub last_saved: String,

    pub time_scale: f64,
    pub time_unit: String,
    pub default_scale_unit: String,
    pub currency_unit: String,
    pub grid_pixels: u32,

    pub timeout_period: f64,
    pub block_length: i64,
    pub start_period: i64,
    pub end_period: i64,
    pub look_ahead_period: i64,
    pub round_sequence: String,

    pub current_timestep: i64,
    pub zoom: f64,
    pub rounds: u32,

    pub encrypt: bool,
    pub decimal_comma: bool,
    pub align_to_grid: bool,
    pub cost_prices: bool,
    pub report_results: bool,
    pub block_arrows: bool,

    /// Precision datasets' raw data and run-result vectors are rounded to
    /// before being written. Not itself a `<model>` attribute; plumbed
    /// through from `ModelConfig::dataset_precision`/`results_precision`.
    pub dataset_precision: u32,
    pub results_precision: u32,

    /// Elements this crate's scope doesn't model as first-class data
    /// (`<base-case-selectors>`, `<sensitivity-parameters>`,
    /// `<sensitivity-outcomes>`, `<sensitivity-delta>`,
    /// `<sensitivity-runs>`, `<imports>`, `<exports>`): captured verbatim on
    /// read, re-emitted byte-identical on write, so round-tripping a
    /// document that uses them doesn't silently drop content.
    pub base_case_selectors: String,
    pub sensitivity_parameters: String,
    pub sensitivity_outcomes: String,
    pub sensitivity_delta: String,
    pub sensitivity_runs: String,
    pub imports: String,
    pub exports: String,
}

impl ModelDocument {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            name: String::new(),
            author: String::new(),
            notes: String::new(),
            version: "1".to_string(),
            last_saved: String::new(),
            time_scale: 1.0,
            time_unit: "hour".to_string(),
            default_scale_unit: linnyr_model::BASE_UNIT.to_string(),
            currency_unit: "EUR".to_string(),
            grid_pixels: 20,
            timeout_period: 60.0,
            block_length: 24,
            start_period: 1,
            end_period: 24,
            look_ahead_period: 0,
            round_sequence: "1".to_string(),
            current_timestep: 1,
            zoom: 1.0,
            rounds: 1,
            encrypt: false,
            decimal_comma: false,
            align_to_grid: true,
            cost_prices: true,
            report_results: true,
            block_arrows: false,
            dataset_precision: 8,
            results_precision: 8,
            base_case_selectors: String::new(),
            sensitivity_parameters: String::new(),
            sensitivity_outcomes: String::new(),
            sensitivity_delta: String::new(),
            sensitivity_runs: String::new(),
            imports: String::new(),
            exports: String::new(),
        }
    }
}
