/// Declared argument shape for a statistics operator (`min$`, `sum$`, ...).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArgKind {
    Number,
    Any,
}

impl ArgKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Self::Number,
            "" | "_" | "any" => Self::Any,
            other => panic!("Unknown arg kind '{other}'"),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ArgSpec {
    pub kind: ArgKind,
}

impl ArgSpec {
    pub const fn new(kind: ArgKind) -> Self {
        Self { kind }
    }
}
