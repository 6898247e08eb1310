use super::ast::{AstExpr, SortItem};
use crate::logical::logical_window::{FrameBoundType, FrameType};

/// Window of a window function call with named window references already
/// resolved.
///
/// Parts coming from a named window are analyzed in the scope the window
/// was defined in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWindow {
    pub partition_by: Vec<AstExpr>,
    pub order_by: Vec<SortItem>,
    pub frame: Option<WindowFrameSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrameSpec {
    pub frame_type: FrameType,
    pub start: FrameBoundSpec,
    /// Defaults to CURRENT ROW when omitted.
    pub end: Option<FrameBoundSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameBoundSpec {
    pub bound_type: FrameBoundType,
    /// Offset expression for `<expr> PRECEDING` and `<expr> FOLLOWING`.
    pub value: Option<AstExpr>,
}

impl FrameBoundSpec {
    pub fn new(bound_type: FrameBoundType) -> Self {
        FrameBoundSpec {
            bound_type,
            value: None,
        }
    }

    pub fn with_offset(bound_type: FrameBoundType, value: AstExpr) -> Self {
        FrameBoundSpec {
            bound_type,
            value: Some(value),
        }
    }
}

impl WindowFrameSpec {
    pub fn start_value(&self) -> Option<&AstExpr> {
        self.start.value.as_ref()
    }

    pub fn end_value(&self) -> Option<&AstExpr> {
        self.end.as_ref().and_then(|end| end.value.as_ref())
    }
}
