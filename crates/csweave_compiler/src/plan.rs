//! Turns validated specifications into weaving plans: the ordered steps a
//! bytecode rewriter performs at every matching call site.

use crate::stack::{operand_for, OperandLayout, StackOp, StackStrategy, StackValue};
use crate::types::{InjectionKind, ParameterRole, ResolvedMethod};
use crate::validate::ValidatedSpecification;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("{kind} advice `{advice}` has no operand strategy")]
    MissingStackStrategy { kind: InjectionKind, advice: String },
    #[error("role {role} of `{advice}` reads no call-site operand")]
    MissingOperand { role: ParameterRole, advice: String },
}

/// A method referenced from woven code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodTarget {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub is_constructor: bool,
}

impl MethodTarget {
    fn of(method: &ResolvedMethod) -> Self {
        Self {
            owner: method.owner.to_string(),
            name: method.name.clone(),
            descriptor: method.descriptor(),
            is_static: method.is_static,
            is_constructor: method.is_constructor(),
        }
    }
}

/// Where an advice argument comes from at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ParameterSource {
    /// Receiver, or the constructed instance for constructor After advice.
    This,
    Argument { index: u16 },
    ReturnValue,
    AllArguments { include_this: bool },
}

impl From<ParameterRole> for ParameterSource {
    fn from(role: ParameterRole) -> Self {
        match role {
            ParameterRole::This => ParameterSource::This,
            ParameterRole::Argument { index } => ParameterSource::Argument { index },
            ParameterRole::Return => ParameterSource::ReturnValue,
            ParameterRole::AllArguments { include_this } => {
                ParameterSource::AllArguments { include_this }
            }
        }
    }
}

/// Where a packed `Object[]` of the arguments ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayPlacement {
    /// Pushed above the untouched operands.
    OnTop,
    /// Inserted beneath the operands so it outlives the call.
    BelowOperands,
    /// Built from operands previously moved into locals.
    FromStoredOperands,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WeavingStep {
    Stack { op: StackOp },
    PackArguments {
        include_this: bool,
        placement: ArrayPlacement,
    },
    /// Moves the top `count` operands into fresh locals.
    StoreOperands { count: usize },
    /// Pushes an operand saved by `StoreOperands`.
    LoadOperand { value: StackValue },
    InvokeAdvice,
    InvokeOriginal,
    /// The advice result stands in for the call's result.
    ReplaceResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeavingPlan {
    pub kind: InjectionKind,
    pub advice: MethodTarget,
    pub pointcut: MethodTarget,
    pub parameters: Vec<ParameterSource>,
    pub steps: Vec<WeavingStep>,
}

/// Builds the plan of a validated specification.
pub fn generate(spec: &ValidatedSpecification) -> Result<WeavingPlan, PlanError> {
    let layout = OperandLayout::of(spec.pointcut());
    let builder = StepBuilder { spec, layout: &layout };
    let steps = match spec.kind() {
        InjectionKind::Around => builder.around()?,
        kind => {
            let stack = spec.stack().ok_or_else(|| PlanError::MissingStackStrategy {
                kind,
                advice: spec.advice().to_string(),
            })?;
            if kind == InjectionKind::Before {
                builder.before(stack)?
            } else {
                builder.after(stack)?
            }
        }
    };

    Ok(WeavingPlan {
        kind: spec.kind(),
        advice: MethodTarget::of(spec.advice()),
        pointcut: MethodTarget::of(spec.pointcut()),
        parameters: spec.roles().iter().copied().map(ParameterSource::from).collect(),
        steps,
    })
}

struct StepBuilder<'a> {
    spec: &'a ValidatedSpecification,
    layout: &'a OperandLayout,
}

impl StepBuilder<'_> {
    fn before(&self, stack: &StackStrategy) -> Result<Vec<WeavingStep>, PlanError> {
        let mut steps = match stack {
            StackStrategy::Copy(ops) => stack_steps(ops),
            StackStrategy::PackArguments { include_this } => vec![WeavingStep::PackArguments {
                include_this: *include_this,
                placement: ArrayPlacement::OnTop,
            }],
            StackStrategy::Infeasible => {
                let mut steps = self.store_operands();
                steps.extend(self.load_operands());
                steps.extend(self.load_roles()?);
                steps
            }
        };
        steps.push(WeavingStep::InvokeAdvice);
        steps.push(WeavingStep::InvokeOriginal);
        Ok(steps)
    }

    fn after(&self, stack: &StackStrategy) -> Result<Vec<WeavingStep>, PlanError> {
        let mut steps = match stack {
            StackStrategy::Copy(ops) => stack_steps(ops),
            StackStrategy::PackArguments { include_this } => vec![WeavingStep::PackArguments {
                include_this: *include_this,
                placement: ArrayPlacement::BelowOperands,
            }],
            StackStrategy::Infeasible => {
                let mut steps = self.store_operands();
                steps.extend(self.load_roles()?);
                steps.extend(self.load_operands());
                steps
            }
        };
        steps.push(WeavingStep::InvokeOriginal);
        steps.push(WeavingStep::InvokeAdvice);
        if self.spec.advice().produces_value() {
            steps.push(WeavingStep::ReplaceResult);
        }
        Ok(steps)
    }

    /// Around advice replaces the call. When it takes exactly the call's
    /// operands in order the invocation is swapped in place.
    fn around(&self) -> Result<Vec<WeavingStep>, PlanError> {
        let operands: Vec<StackValue> = self
            .layout
            .operands()
            .into_iter()
            .map(|slot| slot.value)
            .collect();
        let reads: Option<Vec<StackValue>> = self
            .spec
            .roles()
            .iter()
            .map(|role| operand_for(*role, self.layout, InjectionKind::Around))
            .collect();
        if reads.as_ref() == Some(&operands) {
            return Ok(vec![WeavingStep::InvokeAdvice]);
        }

        let mut steps = self.store_operands();
        steps.extend(self.load_roles()?);
        steps.push(WeavingStep::InvokeAdvice);
        Ok(steps)
    }

    fn store_operands(&self) -> Vec<WeavingStep> {
        vec![WeavingStep::StoreOperands {
            count: self.layout.operands().len(),
        }]
    }

    fn load_operands(&self) -> Vec<WeavingStep> {
        self.layout
            .operands()
            .into_iter()
            .map(|slot| WeavingStep::LoadOperand { value: slot.value })
            .collect()
    }

    /// Loads the advice arguments held in locals, skipping the ones the
    /// call itself provides.
    fn load_roles(&self) -> Result<Vec<WeavingStep>, PlanError> {
        let kind = self.spec.kind();
        let mut steps = Vec::new();
        for role in self.spec.roles() {
            match *role {
                ParameterRole::Return => {}
                ParameterRole::This if self.layout.constructor && kind == InjectionKind::After => {}
                ParameterRole::AllArguments { include_this } => {
                    steps.push(WeavingStep::PackArguments {
                        include_this,
                        placement: ArrayPlacement::FromStoredOperands,
                    })
                }
                role => {
                    let value = operand_for(role, self.layout, kind).ok_or_else(|| {
                        PlanError::MissingOperand {
                            role,
                            advice: self.spec.advice().to_string(),
                        }
                    })?;
                    steps.push(WeavingStep::LoadOperand { value });
                }
            }
        }
        Ok(steps)
    }
}

fn stack_steps(ops: &[StackOp]) -> Vec<WeavingStep> {
    ops.iter().map(|op| WeavingStep::Stack { op: *op }).collect()
}
