//! Strategy rule components: conditions gate a group, entry and exit rules
//! price the trade.
//!
//! Every component is built once from a rule file and rebound to each
//! security with `bind_security` before that security is evaluated.

pub mod condition;
pub mod entry;
pub mod exit;

use crate::domain::error::NoDataError;
use crate::domain::indicator::Indicator;
use crate::domain::order::RuleTiming;
use crate::domain::security::Security;
use std::rc::Rc;

pub use condition::Condition;
pub use entry::EntryRule;
pub use exit::ExitRule;

/// The security a component is bound to; unbound components have no data.
pub(crate) fn bound(security: &Option<Rc<Security>>) -> Result<&Security, NoDataError> {
    security.as_deref().ok_or(NoDataError)
}

pub(crate) fn derived(indicator: &Option<Indicator>) -> Result<&Indicator, NoDataError> {
    indicator.as_ref().ok_or(NoDataError)
}

/// Open price at OPEN, close price at CLOSE, nothing during the session.
pub(crate) fn slot_price(
    security: &Security,
    idx: usize,
    timing: RuleTiming,
) -> Result<Option<f64>, NoDataError> {
    let bar = security.bar(idx)?;
    Ok(match timing {
        RuleTiming::Open => Some(bar.open),
        RuleTiming::Close => Some(bar.close),
        RuleTiming::Session | RuleTiming::Anytime => None,
    })
}
