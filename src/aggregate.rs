//! COUNT, SUM and AVERAGE over a scan
//!
//! Aggregates pull the same `Scanner` as every other scope-driven command,
//! so FOR/WHILE handling and the final pointer position are identical.
//! The expression must be numeric; `Null` results are left out of both the
//! total and the AVERAGE divisor.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::scan::{Condition, Expr, Scope};
use crate::value::Value;

impl Runtime {
    pub fn count(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<u64> {
        let mut count = 0;
        let mut scanner = self.scan(target, scope, for_cond, while_cond)?;
        scanner.run(self, |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    pub fn sum(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        expr: Expr,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<f64> {
        let (total, _) = self.accumulate(target, scope, expr, for_cond, while_cond)?;
        Ok(total)
    }

    /// Mean of `expr` over matching records; 0 when nothing matched
    pub fn average(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        expr: Expr,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<f64> {
        let (total, matched) = self.accumulate(target, scope, expr, for_cond, while_cond)?;
        if matched == 0 {
            return Ok(0.0);
        }
        Ok(total / matched as f64)
    }

    fn accumulate(
        &mut self,
        target: Option<&str>,
        scope: Scope,
        expr: Expr,
        for_cond: Option<Condition>,
        while_cond: Option<Condition>,
    ) -> Result<(f64, u64)> {
        let mut total = 0.0;
        let mut matched = 0;
        let mut scanner = self.scan(target, scope, for_cond, while_cond)?;
        scanner.run(self, |rt, recno| match expr(rt) {
            Value::Numeric(n) => {
                total += n;
                matched += 1;
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(Error::TypeMismatch {
                field: format!("aggregate expression at record {}", recno),
                expected: 'N',
                found: other.vartype(),
            }),
        })?;
        Ok((total, matched))
    }
}
