use std::fmt;

/// File name of a master dark inside its exposure directory.
pub const MASTER_DARK_NAME: &str = "master-dark.fit";

/// File name of a normalized flatfield inside its flat directory.
pub const FLATFIELD_NAME: &str = "flatfield.fit";

/// File name of an object's final stacked image.
pub const STACK_NAME: &str = "stack.fit";

/// File name of a reference-minus-target difference frame.
pub const DIFFERENCE_NAME: &str = "subtract.fit";

/// Pipeline stage products, each with a fixed naming convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    MasterDark,
    Flatfield,
    Reduced,
    Solved,
    Aligned,
    Stacked,
    Difference,
}

impl StageKind {
    /// Prefix prepended to the input file name for per-frame products.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            StageKind::Reduced => Some("reduced-"),
            StageKind::Solved => Some("wcs-"),
            StageKind::Aligned => Some("a-"),
            _ => None,
        }
    }

    /// Fixed product name of group-level stages.
    pub fn group_product(self) -> Option<&'static str> {
        match self {
            StageKind::MasterDark => Some(MASTER_DARK_NAME),
            StageKind::Flatfield => Some(FLATFIELD_NAME),
            StageKind::Stacked => Some(STACK_NAME),
            StageKind::Difference => Some(DIFFERENCE_NAME),
            _ => None,
        }
    }

    /// Output file name for an input file name. Group-level stages ignore the input.
    pub fn output_name(self, input_name: &str) -> String {
        match (self.prefix(), self.group_product()) {
            (Some(prefix), _) => format!("{prefix}{input_name}"),
            (None, Some(name)) => name.to_string(),
            (None, None) => input_name.to_string(),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::MasterDark => write!(f, "Master dark"),
            StageKind::Flatfield => write!(f, "Flatfield"),
            StageKind::Reduced => write!(f, "Reduction"),
            StageKind::Solved => write!(f, "Plate solve"),
            StageKind::Aligned => write!(f, "Alignment"),
            StageKind::Stacked => write!(f, "Stack"),
            StageKind::Difference => write!(f, "Difference"),
        }
    }
}

/// True for file names produced by a group-level stage.
pub fn is_group_product(name: &str) -> bool {
    [MASTER_DARK_NAME, FLATFIELD_NAME, STACK_NAME, DIFFERENCE_NAME].contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_names_chain() {
        let reduced = StageKind::Reduced.output_name("m42-001.fit");
        let solved = StageKind::Solved.output_name(&reduced);
        let aligned = StageKind::Aligned.output_name(&solved);
        assert_eq!(aligned, "a-wcs-reduced-m42-001.fit");
    }

    #[test]
    fn test_group_names_are_fixed() {
        assert_eq!(StageKind::MasterDark.output_name("anything.fit"), MASTER_DARK_NAME);
        assert_eq!(StageKind::Stacked.output_name(""), STACK_NAME);
        assert!(is_group_product("flatfield.fit"));
        assert!(is_group_product("subtract.fit"));
        assert!(!is_group_product("flat-001.fit"));
    }
}
