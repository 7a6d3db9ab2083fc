//! Symbolic operand-stack simulation.
//!
//! Before and After advice receive copies of the call-site operands. Those
//! copies have to be produced with stack instructions only, so the
//! compiler searches for the shortest sequence of `dup*`, `swap` and `pop*`
//! instructions that turns the call site's stack into the stack the advice
//! invocation needs.

use crate::types::{InjectionKind, ParameterRole, ResolvedMethod};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// A call-site operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "operand", rename_all = "snake_case")]
pub enum StackValue {
    Receiver,
    /// Uninitialized reference consumed by a constructor call.
    NewInstance,
    Argument { index: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub value: StackValue,
    /// Words occupied: 2 for `long` and `double`, 1 otherwise.
    pub width: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOp {
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Pop,
    Pop2,
}

impl StackOp {
    pub const ALL: [StackOp; 9] = [
        StackOp::Dup,
        StackOp::DupX1,
        StackOp::DupX2,
        StackOp::Dup2,
        StackOp::Dup2X1,
        StackOp::Dup2X2,
        StackOp::Swap,
        StackOp::Pop,
        StackOp::Pop2,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            StackOp::Dup => "dup",
            StackOp::DupX1 => "dup_x1",
            StackOp::DupX2 => "dup_x2",
            StackOp::Dup2 => "dup2",
            StackOp::Dup2X1 => "dup2_x1",
            StackOp::Dup2X2 => "dup2_x2",
            StackOp::Swap => "swap",
            StackOp::Pop => "pop",
            StackOp::Pop2 => "pop2",
        }
    }

    /// Applies the instruction, or `None` when the JVM would reject it on
    /// this stack (too few words, or a two-word value would be split).
    pub fn apply(self, stack: &[Slot]) -> Option<Vec<Slot>> {
        match self {
            StackOp::Dup => copy_words(stack, 1, 0),
            StackOp::DupX1 => copy_words(stack, 1, 1),
            StackOp::DupX2 => copy_words(stack, 1, 2),
            StackOp::Dup2 => copy_words(stack, 2, 0),
            StackOp::Dup2X1 => copy_words(stack, 2, 1),
            StackOp::Dup2X2 => copy_words(stack, 2, 2),
            StackOp::Swap => {
                top_values(stack, 1)?;
                top_values(&stack[..stack.len() - 1], 1)?;
                let mut out = stack.to_vec();
                let len = out.len();
                out.swap(len - 1, len - 2);
                Some(out)
            }
            StackOp::Pop => drop_words(stack, 1),
            StackOp::Pop2 => drop_words(stack, 2),
        }
    }
}

impl fmt::Display for StackOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Number of top values covering exactly `words` words.
fn top_values(stack: &[Slot], words: u8) -> Option<(usize, u8)> {
    let mut total = 0u8;
    let mut count = 0usize;
    for slot in stack.iter().rev() {
        if total >= words {
            break;
        }
        total += slot.width;
        count += 1;
    }
    (total == words).then_some((count, total))
}

fn copy_words(stack: &[Slot], copy: u8, under: u8) -> Option<Vec<Slot>> {
    let (copied, _) = top_values(stack, copy)?;
    let rest = &stack[..stack.len() - copied];
    let skipped = if under == 0 {
        0
    } else {
        top_values(rest, under)?.0
    };
    let insert_at = rest.len() - skipped;

    let mut out = Vec::with_capacity(stack.len() + copied);
    out.extend_from_slice(&stack[..insert_at]);
    out.extend_from_slice(&stack[stack.len() - copied..]);
    out.extend_from_slice(&stack[insert_at..]);
    Some(out)
}

fn drop_words(stack: &[Slot], words: u8) -> Option<Vec<Slot>> {
    let (count, _) = top_values(stack, words)?;
    Some(stack[..stack.len() - count].to_vec())
}

/// Shortest instruction sequence rewriting `initial` into `goal`, searching
/// at most `max_ops` instructions deep.
pub fn find_program(initial: &[Slot], goal: &[Slot], max_ops: usize) -> Option<Vec<StackOp>> {
    if initial == goal {
        return Some(Vec::new());
    }
    let needed: HashSet<StackValue> = goal.iter().map(|slot| slot.value).collect();
    let max_len = goal.len().max(initial.len()) + 2;

    let mut parents: HashMap<Vec<Slot>, (Vec<Slot>, StackOp)> = HashMap::new();
    let mut seen: HashSet<Vec<Slot>> = HashSet::from([initial.to_vec()]);
    let mut queue = VecDeque::from([(initial.to_vec(), 0usize)]);

    while let Some((state, depth)) = queue.pop_front() {
        if depth == max_ops {
            continue;
        }
        for op in StackOp::ALL {
            let Some(next) = op.apply(&state) else {
                continue;
            };
            if next.len() > max_len || seen.contains(&next) {
                continue;
            }
            // Values are never recreated once popped.
            if !needed
                .iter()
                .all(|value| next.iter().any(|slot| slot.value == *value))
            {
                continue;
            }
            seen.insert(next.clone());
            parents.insert(next.clone(), (state.clone(), op));
            if next == goal {
                return Some(unwind(&parents, initial, next));
            }
            queue.push_back((next, depth + 1));
        }
    }
    None
}

fn unwind(
    parents: &HashMap<Vec<Slot>, (Vec<Slot>, StackOp)>,
    initial: &[Slot],
    mut state: Vec<Slot>,
) -> Vec<StackOp> {
    let mut program = Vec::new();
    while state != initial {
        let Some((parent, op)) = parents.get(&state) else {
            break;
        };
        program.push(*op);
        state = parent.clone();
    }
    program.reverse();
    program
}

/// Operands of a call site, in stack order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandLayout {
    pub constructor: bool,
    pub has_receiver: bool,
    pub argument_widths: Vec<u8>,
}

impl OperandLayout {
    pub fn of(pointcut: &ResolvedMethod) -> Self {
        Self {
            constructor: pointcut.is_constructor(),
            has_receiver: !pointcut.is_static,
            argument_widths: pointcut
                .parameters
                .iter()
                .map(|parameter| parameter.slot_width())
                .collect(),
        }
    }

    /// The operands consumed by the call. For constructors this is the
    /// uninitialized reference followed by the arguments; the duplicate left
    /// beneath it by `new; dup` is out of reach.
    pub fn operands(&self) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(self.argument_widths.len() + 1);
        if self.constructor {
            slots.push(Slot {
                value: StackValue::NewInstance,
                width: 1,
            });
        } else if self.has_receiver {
            slots.push(Slot {
                value: StackValue::Receiver,
                width: 1,
            });
        }
        slots.extend(self.argument_widths.iter().enumerate().map(|(index, width)| Slot {
            value: StackValue::Argument {
                index: index as u16,
            },
            width: *width,
        }));
        slots
    }

    pub fn slot(&self, value: StackValue) -> Option<Slot> {
        self.operands().into_iter().find(|slot| slot.value == value)
    }
}

/// How Before/After advice obtains its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStrategy {
    /// Copy operands with stack instructions.
    Copy(Vec<StackOp>),
    /// Box the arguments into an `Object[]`.
    PackArguments { include_this: bool },
    /// Operands cannot be arranged; only valid when the stack check is relaxed.
    Infeasible,
}

/// Call-site values an advice needs copied onto the stack, in advice
/// parameter order. `Return` is produced by the call itself and the `this`
/// of constructor After advice is the surviving duplicate reference.
pub fn required_values(
    roles: &[ParameterRole],
    layout: &OperandLayout,
    kind: InjectionKind,
) -> Vec<StackValue> {
    roles
        .iter()
        .filter_map(|role| operand_for(*role, layout, kind))
        .collect()
}

/// The call-site operand a role reads, if it reads one.
pub fn operand_for(
    role: ParameterRole,
    layout: &OperandLayout,
    kind: InjectionKind,
) -> Option<StackValue> {
    match role {
        ParameterRole::This if layout.constructor && kind == InjectionKind::After => None,
        ParameterRole::This if layout.constructor => Some(StackValue::NewInstance),
        ParameterRole::This => Some(StackValue::Receiver),
        ParameterRole::Argument { index } => Some(StackValue::Argument { index }),
        ParameterRole::Return | ParameterRole::AllArguments { .. } => None,
    }
}

/// Decides how the operands for a Before or After advice are produced.
pub fn plan_stack(
    roles: &[ParameterRole],
    layout: &OperandLayout,
    kind: InjectionKind,
    max_ops: usize,
) -> StackStrategy {
    let required = required_values(roles, layout, kind);
    let all_arguments = roles.iter().find_map(|role| match role {
        ParameterRole::AllArguments { include_this } => Some(*include_this),
        _ => None,
    });
    if let Some(include_this) = all_arguments {
        let packable = required.is_empty() && !(include_this && layout.constructor);
        return if packable {
            StackStrategy::PackArguments { include_this }
        } else {
            StackStrategy::Infeasible
        };
    }

    let Some(required_slots) = required
        .iter()
        .map(|value| layout.slot(*value))
        .collect::<Option<Vec<_>>>()
    else {
        return StackStrategy::Infeasible;
    };
    let operands = layout.operands();
    let goal: Vec<Slot> = match kind {
        InjectionKind::Before => operands.iter().chain(&required_slots).copied().collect(),
        InjectionKind::After | InjectionKind::Around => {
            required_slots.iter().chain(&operands).copied().collect()
        }
    };
    match find_program(&operands, &goal, max_ops) {
        Some(program) => StackStrategy::Copy(program),
        None => StackStrategy::Infeasible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn arg(index: u16, width: u8) -> Slot {
        Slot {
            value: StackValue::Argument { index },
            width,
        }
    }

    fn receiver() -> Slot {
        Slot {
            value: StackValue::Receiver,
            width: 1,
        }
    }

    fn layout(constructor: bool, has_receiver: bool, widths: &[u8]) -> OperandLayout {
        OperandLayout {
            constructor,
            has_receiver,
            argument_widths: widths.to_vec(),
        }
    }

    #[test]
    fn dup_family_respects_two_word_values() {
        let long = arg(0, 2);
        let int = arg(1, 1);
        assert_eq!(StackOp::Dup.apply(&[long]), None);
        assert_eq!(StackOp::Dup2.apply(&[long]), Some(vec![long, long]));
        assert_eq!(StackOp::Swap.apply(&[long, int]), None);
        assert_eq!(StackOp::DupX1.apply(&[long, int]), None);
        assert_eq!(StackOp::DupX2.apply(&[long, int]), Some(vec![int, long, int]));
        assert_eq!(StackOp::Pop2.apply(&[int, arg(2, 1)]), Some(vec![int]));
        assert_eq!(StackOp::Pop2.apply(&[long, int]), None);
    }

    #[test]
    fn constructor_after_copies_argument_beneath_new_instance() {
        let layout = layout(true, false, &[1]);
        let strategy = plan_stack(
            &[ParameterRole::This, ParameterRole::Argument { index: 0 }],
            &layout,
            InjectionKind::After,
            8,
        );
        assert_eq!(strategy, StackStrategy::Copy(vec![StackOp::DupX1]));
    }

    #[test]
    fn before_duplicates_receiver_and_argument() {
        let layout = layout(false, true, &[1]);
        let strategy = plan_stack(
            &[ParameterRole::This, ParameterRole::Argument { index: 0 }],
            &layout,
            InjectionKind::Before,
            8,
        );
        assert_eq!(strategy, StackStrategy::Copy(vec![StackOp::Dup2]));
    }

    #[test]
    fn after_with_only_return_needs_no_copies() {
        let layout = layout(false, true, &[1]);
        let strategy = plan_stack(&[ParameterRole::Return], &layout, InjectionKind::After, 8);
        assert_eq!(strategy, StackStrategy::Copy(Vec::new()));
    }

    #[test]
    fn programs_transform_initial_into_goal() {
        let initial = vec![receiver(), arg(0, 1), arg(1, 2)];
        let goal = vec![receiver(), arg(0, 1), receiver(), arg(0, 1), arg(1, 2)];
        let program = find_program(&initial, &goal, 8).expect("feasible");
        assert!(program.len() <= 5, "{program:?}");
        let mut state = initial;
        for op in &program {
            state = op.apply(&state).expect("valid step");
        }
        assert_eq!(state, goal);
    }

    #[test_case(&[1, 1, 1, 1], &[0, 1, 2, 3] ; "four one-word arguments")]
    #[test_case(&[2, 2, 2], &[0, 2] ; "three longs")]
    fn deep_copies_exceed_a_small_bound(widths: &[u8], indices: &[u16]) {
        let layout = layout(false, false, widths);
        let roles: Vec<_> = indices
            .iter()
            .map(|index| ParameterRole::Argument { index: *index })
            .collect();
        assert_eq!(
            plan_stack(&roles, &layout, InjectionKind::Before, 2),
            StackStrategy::Infeasible
        );
    }

    #[test]
    fn all_arguments_is_only_packable_alone() {
        let layout = layout(false, true, &[1, 1]);
        assert_eq!(
            plan_stack(
                &[ParameterRole::AllArguments { include_this: true }],
                &layout,
                InjectionKind::Before,
                8
            ),
            StackStrategy::PackArguments { include_this: true }
        );
        assert_eq!(
            plan_stack(
                &[
                    ParameterRole::This,
                    ParameterRole::AllArguments { include_this: false }
                ],
                &layout,
                InjectionKind::Before,
                8
            ),
            StackStrategy::Infeasible
        );

        let constructor = self::layout(true, false, &[1]);
        assert_eq!(
            plan_stack(
                &[ParameterRole::AllArguments { include_this: true }],
                &constructor,
                InjectionKind::After,
                8
            ),
            StackStrategy::Infeasible
        );
    }
}
