//! The constant-tracking analyzer.
//!
//! A forward fixed-point abstract interpretation over a method's
//! instruction sequence and its exception edges, computing a [`Frame`] of
//! [`ConstantValue`]s per instruction. The domain is the flat lattice from
//! [`value`](crate::analysis::value): any join of two distinct known values
//! degrades to `Unknown`, so the analysis converges quickly and never
//! speculates.
//!
//! Arrays receive limited tracking: an allocation with a known length is
//! given an identity in a side table, stores with known indices update its
//! elements, and any escape (call argument, field store, array-into-array
//! store) poisons the identity so later loads report `Unknown`. That is
//! exactly enough to follow the index/key tables obfuscators build in
//! static initializers.
//!
//! The analyzer is deterministic and side-effect free; its only output is
//! the frame vector, `None` at unreachable positions.

use std::collections::VecDeque;

use crate::{
    analysis::{
        frame::Frame,
        value::{constant_of_ldc, ArrayId, Constant, ConstantValue},
    },
    ir::{opcodes as op, Insn, JvmType, MethodDescriptor, MethodNode},
    Error, Result,
};

/// Collaborator that lets the analyzer treat selected field loads and
/// method returns as constants.
///
/// The default implementation knows nothing; passes supply one when they
/// can vouch for a field's value or a method's purity.
pub trait ConstantReferenceHandler {
    /// A known-constant value for the given field, or `None`.
    fn field_value(&self, _owner: &str, _name: &str, _desc: &str) -> Option<Constant> {
        None
    }

    /// The return value of a pure, deterministic method for the given
    /// (partially) known arguments, or `None`.
    fn method_return(
        &self,
        _owner: &str,
        _name: &str,
        _desc: &str,
        _args: &[ConstantValue],
    ) -> Option<Constant> {
        None
    }
}

/// The do-nothing reference handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstantReferences;

impl ConstantReferenceHandler for NoConstantReferences {}

/// Runs the constant tracker over `method`.
///
/// Returns a frame vector parallel to `method.insns`; unreachable
/// positions hold `None`. Each frame describes the state *before* its
/// instruction executes.
///
/// # Errors
///
/// Fails on verification inconsistencies (stack underflow, merge height
/// mismatch, jumps to unknown labels) and on `JSR`/`RET`, which the engine
/// does not model. Callers treat a failure as "no frames for this method".
pub fn analyze(
    method: &MethodNode,
    handler: &dyn ConstantReferenceHandler,
) -> Result<Vec<Option<Frame>>> {
    let n = method.insns.len();
    let mut frames: Vec<Option<Frame>> = vec![None; n];
    if n == 0 {
        return Ok(frames);
    }

    let labels = method.label_positions();
    let resolve = |label: u32| -> Result<usize> {
        labels
            .get(&label)
            .copied()
            .ok_or_else(|| Error::Analysis(format!("jump to unknown label {label}")))
    };

    // Handler ranges resolved to instruction indices once up front.
    let mut handlers: Vec<(usize, usize, usize)> = Vec::new();
    for tcb in &method.try_catch_blocks {
        handlers.push((resolve(tcb.start)?, resolve(tcb.end)?, resolve(tcb.handler)?));
    }

    let mut analyzer = Analyzer {
        handler,
        arrays: Vec::new(),
    };

    frames[0] = Some(entry_frame(method)?);
    let mut worklist: VecDeque<usize> = VecDeque::from([0]);
    let mut budget = 50usize.saturating_mul(n).saturating_add(10_000);

    while let Some(idx) = worklist.pop_front() {
        budget = budget
            .checked_sub(1)
            .ok_or_else(|| Error::Analysis("constant tracking did not converge".into()))?;

        let frame = frames[idx].clone().expect("worklist entries have frames");

        // Exception edges: any instruction inside a protected range can
        // transfer to the handler with the locals it saw on entry.
        for &(start, end, target) in &handlers {
            if idx >= start && idx < end {
                propagate(&mut frames, &mut worklist, target, frame.with_handler_stack())?;
            }
        }

        let flow = analyzer.execute(&method.insns[idx], frame, &resolve)?;
        if let Some(out) = flow.out {
            if flow.fallthrough {
                if idx + 1 >= n {
                    return Err(Error::Analysis("execution falls off method end".into()));
                }
                propagate(&mut frames, &mut worklist, idx + 1, out.clone())?;
            }
            for target in flow.targets {
                propagate(&mut frames, &mut worklist, target, out.clone())?;
            }
        }
    }

    Ok(frames)
}

fn propagate(
    frames: &mut [Option<Frame>],
    worklist: &mut VecDeque<usize>,
    target: usize,
    frame: Frame,
) -> Result<()> {
    match &mut frames[target] {
        Some(existing) => {
            if existing.merge(&frame)? {
                worklist.push_back(target);
            }
        }
        slot @ None => {
            *slot = Some(frame);
            worklist.push_back(target);
        }
    }
    Ok(())
}

fn entry_frame(method: &MethodNode) -> Result<Frame> {
    let desc = MethodDescriptor::parse(&method.desc)?;
    let mut locals = Vec::new();
    if !method.access.is_static() {
        locals.push(ConstantValue::unknown(1));
    }
    for param in &desc.params {
        let size = param.slot_size();
        locals.push(ConstantValue::unknown(size));
        if size == 2 {
            locals.push(ConstantValue::unknown(1));
        }
    }
    while locals.len() < usize::from(method.max_locals) {
        locals.push(ConstantValue::unknown(1));
    }
    Ok(Frame::new(locals))
}

/// Control-flow result of executing one instruction.
struct Flow {
    /// State after the instruction; `None` if execution ends here.
    out: Option<Frame>,
    /// Whether the next instruction in sequence is a successor.
    fallthrough: bool,
    /// Explicit jump targets receiving the out state.
    targets: Vec<usize>,
}

impl Flow {
    fn next(out: Frame) -> Flow {
        Flow {
            out: Some(out),
            fallthrough: true,
            targets: Vec::new(),
        }
    }

    fn stop() -> Flow {
        Flow {
            out: None,
            fallthrough: false,
            targets: Vec::new(),
        }
    }
}

struct Analyzer<'h> {
    handler: &'h dyn ConstantReferenceHandler,
    /// Tracked array contents; `None` marks a poisoned (escaped) identity.
    arrays: Vec<Option<Vec<ConstantValue>>>,
}

/// Largest array length the side table will materialize.
const MAX_TRACKED_ARRAY: i32 = 4096;

impl Analyzer<'_> {
    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        insn: &Insn,
        mut f: Frame,
        resolve: &dyn Fn(u32) -> Result<usize>,
    ) -> Result<Flow> {
        use ConstantValue as CV;

        match insn {
            Insn::Label(_) | Insn::Line { .. } | Insn::Frame => Ok(Flow::next(f)),

            Insn::Simple { op } => self.execute_simple(*op, f),

            Insn::IntOp { op, operand } => {
                match *op {
                    op::BIPUSH | op::SIPUSH => f.push(CV::known(Constant::Int(*operand))),
                    op::NEWARRAY => {
                        let len = f.pop()?;
                        let default = match *operand {
                            op::array_type::T_LONG => Constant::Long(0),
                            op::array_type::T_FLOAT => Constant::Float(0.0),
                            op::array_type::T_DOUBLE => Constant::Double(0.0),
                            _ => Constant::Int(0),
                        };
                        let value = self.alloc_array(&len, &default);
                        f.push(value);
                    }
                    other => {
                        return Err(Error::Analysis(format!("unexpected int operand op {other:#x}")))
                    }
                }
                Ok(Flow::next(f))
            }

            Insn::Var { op: o, var } => {
                match *o {
                    op::ILOAD | op::FLOAD | op::ALOAD => {
                        let v = f
                            .local(*var)
                            .cloned()
                            .unwrap_or_else(|| CV::unknown(1));
                        f.push(v);
                    }
                    op::LLOAD | op::DLOAD => {
                        let v = f
                            .local(*var)
                            .cloned()
                            .unwrap_or_else(|| CV::unknown(2));
                        f.push(v);
                    }
                    op::ISTORE | op::FSTORE | op::ASTORE | op::LSTORE | op::DSTORE => {
                        let v = f.pop()?;
                        let size = v.size();
                        f.set_local(*var, v);
                        if size == 2 {
                            f.set_local(*var + 1, CV::unknown(1));
                        }
                    }
                    op::RET => return Err(Error::Unsupported("JSR/RET subroutines".into())),
                    other => {
                        return Err(Error::Analysis(format!("unexpected var op {other:#x}")))
                    }
                }
                Ok(Flow::next(f))
            }

            Insn::TypeOp { op: o, .. } => {
                match *o {
                    op::NEW => f.push(CV::unknown(1)),
                    op::ANEWARRAY => {
                        let len = f.pop()?;
                        let value = self.alloc_array(&len, &Constant::Null);
                        f.push(value);
                    }
                    op::CHECKCAST => {} // value passes through unchanged
                    op::INSTANCEOF => {
                        f.pop()?;
                        f.push(CV::unknown(1));
                    }
                    other => {
                        return Err(Error::Analysis(format!("unexpected type op {other:#x}")))
                    }
                }
                Ok(Flow::next(f))
            }

            Insn::Field {
                op: o,
                owner,
                name,
                desc,
            } => {
                let ty = JvmType::parse(desc)?;
                match *o {
                    op::GETSTATIC => {
                        f.push(self.field_load(owner, name, desc, &ty));
                    }
                    op::GETFIELD => {
                        f.pop()?;
                        f.push(self.field_load(owner, name, desc, &ty));
                    }
                    op::PUTSTATIC => {
                        let v = f.pop()?;
                        self.escape(&v);
                    }
                    op::PUTFIELD => {
                        let v = f.pop()?;
                        self.escape(&v);
                        f.pop()?;
                    }
                    other => {
                        return Err(Error::Analysis(format!("unexpected field op {other:#x}")))
                    }
                }
                Ok(Flow::next(f))
            }

            Insn::Method {
                op: o,
                owner,
                name,
                desc,
                ..
            } => {
                let md = MethodDescriptor::parse(desc)?;
                let mut args = Vec::with_capacity(md.params.len());
                for _ in &md.params {
                    args.push(f.pop()?);
                }
                args.reverse();
                for a in &args {
                    self.escape(a);
                }
                if *o != op::INVOKESTATIC {
                    let receiver = f.pop()?;
                    self.escape(&receiver);
                }
                if md.ret != JvmType::Void {
                    let ret = self
                        .handler
                        .method_return(owner, name, desc, &args)
                        .map_or_else(|| CV::unknown_of(&md.ret), CV::known);
                    f.push(ret);
                }
                Ok(Flow::next(f))
            }

            Insn::InvokeDynamic { desc, .. } => {
                let md = MethodDescriptor::parse(desc)?;
                for _ in &md.params {
                    let a = f.pop()?;
                    self.escape(&a);
                }
                if md.ret != JvmType::Void {
                    f.push(CV::unknown_of(&md.ret));
                }
                Ok(Flow::next(f))
            }

            Insn::Ldc { constant } => {
                f.push(CV::known(constant_of_ldc(constant)));
                Ok(Flow::next(f))
            }

            Insn::Jump { op: o, target } => {
                let target = resolve(*target)?;
                match *o {
                    op::GOTO => Ok(Flow {
                        out: Some(f),
                        fallthrough: false,
                        targets: vec![target],
                    }),
                    op::JSR => Err(Error::Unsupported("JSR/RET subroutines".into())),
                    cond => {
                        // Pop one operand, or two for the compare forms.
                        f.pop()?;
                        if (op::IF_ICMPEQ..=op::IF_ACMPNE).contains(&cond) {
                            f.pop()?;
                        }
                        Ok(Flow {
                            out: Some(f),
                            fallthrough: true,
                            targets: vec![target],
                        })
                    }
                }
            }

            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => {
                f.pop()?;
                let mut resolved = Vec::with_capacity(targets.len() + 1);
                resolved.push(resolve(*default)?);
                for t in targets {
                    resolved.push(resolve(*t)?);
                }
                resolved.sort_unstable();
                resolved.dedup();
                Ok(Flow {
                    out: Some(f),
                    fallthrough: false,
                    targets: resolved,
                })
            }

            Insn::Iinc { var, incr } => {
                let updated = match f.local(*var).and_then(|v| v.value()) {
                    Some(Constant::Int(v)) => {
                        CV::known(Constant::Int(v.wrapping_add(i32::from(*incr))))
                    }
                    _ => CV::unknown(1),
                };
                f.set_local(*var, updated);
                Ok(Flow::next(f))
            }

            Insn::MultiANewArray { dims, .. } => {
                for _ in 0..*dims {
                    f.pop()?;
                }
                f.push(CV::unknown(1));
                Ok(Flow::next(f))
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn execute_simple(&mut self, o: u8, mut f: Frame) -> Result<Flow> {
        use ConstantValue as CV;

        match o {
            op::NOP => {}
            op::ACONST_NULL => f.push(CV::known(Constant::Null)),
            op::ICONST_M1..=op::ICONST_5 => {
                f.push(CV::known(Constant::Int(i32::from(o) - i32::from(op::ICONST_0))));
            }
            op::LCONST_0 | op::LCONST_1 => {
                f.push(CV::known(Constant::Long(i64::from(o - op::LCONST_0))));
            }
            op::FCONST_0 | op::FCONST_1 | op::FCONST_2 => {
                f.push(CV::known(Constant::Float(f32::from(o - op::FCONST_0))));
            }
            op::DCONST_0 | op::DCONST_1 => {
                f.push(CV::known(Constant::Double(f64::from(o - op::DCONST_0))));
            }

            op::IALOAD..=op::SALOAD => {
                let index = f.pop()?;
                let array = f.pop()?;
                f.push(self.array_load(o, &array, &index));
            }
            op::IASTORE..=op::SASTORE => {
                let value = f.pop()?;
                let index = f.pop()?;
                let array = f.pop()?;
                if o == op::AASTORE {
                    self.escape(&value);
                }
                self.array_store(&array, &index, value);
            }
            op::ARRAYLENGTH => {
                let array = f.pop()?;
                let len = match array.value() {
                    Some(Constant::Array(id)) => self.arrays[*id]
                        .as_ref()
                        .map(|elems| CV::known(Constant::Int(elems.len() as i32))),
                    _ => None,
                };
                f.push(len.unwrap_or_else(|| CV::unknown(1)));
            }

            op::POP => {
                f.pop()?;
            }
            op::POP2 => {
                let top = f.pop()?;
                if top.size() == 1 {
                    f.pop()?;
                }
            }
            op::DUP => {
                let top = f.pop()?;
                f.push(top.clone());
                f.push(top);
            }
            op::DUP_X1 => {
                let v1 = f.pop()?;
                let v2 = f.pop()?;
                f.push(v1.clone());
                f.push(v2);
                f.push(v1);
            }
            op::DUP_X2 => {
                let v1 = f.pop()?;
                let v2 = f.pop()?;
                if v2.size() == 2 {
                    f.push(v1.clone());
                    f.push(v2);
                    f.push(v1);
                } else {
                    let v3 = f.pop()?;
                    f.push(v1.clone());
                    f.push(v3);
                    f.push(v2);
                    f.push(v1);
                }
            }
            op::DUP2 => {
                let v1 = f.pop()?;
                if v1.size() == 2 {
                    f.push(v1.clone());
                    f.push(v1);
                } else {
                    let v2 = f.pop()?;
                    f.push(v2.clone());
                    f.push(v1.clone());
                    f.push(v2);
                    f.push(v1);
                }
            }
            op::DUP2_X1 => {
                let v1 = f.pop()?;
                if v1.size() == 2 {
                    let v2 = f.pop()?;
                    f.push(v1.clone());
                    f.push(v2);
                    f.push(v1);
                } else {
                    let v2 = f.pop()?;
                    let v3 = f.pop()?;
                    f.push(v2.clone());
                    f.push(v1.clone());
                    f.push(v3);
                    f.push(v2);
                    f.push(v1);
                }
            }
            op::DUP2_X2 => {
                let v1 = f.pop()?;
                if v1.size() == 2 {
                    let v2 = f.pop()?;
                    if v2.size() == 2 {
                        f.push(v1.clone());
                        f.push(v2);
                        f.push(v1);
                    } else {
                        let v3 = f.pop()?;
                        f.push(v1.clone());
                        f.push(v3);
                        f.push(v2);
                        f.push(v1);
                    }
                } else {
                    let v2 = f.pop()?;
                    let v3 = f.pop()?;
                    if v3.size() == 2 {
                        f.push(v2.clone());
                        f.push(v1.clone());
                        f.push(v3);
                        f.push(v2);
                        f.push(v1);
                    } else {
                        let v4 = f.pop()?;
                        f.push(v2.clone());
                        f.push(v1.clone());
                        f.push(v4);
                        f.push(v3);
                        f.push(v2);
                        f.push(v1);
                    }
                }
            }
            op::SWAP => {
                let v1 = f.pop()?;
                let v2 = f.pop()?;
                f.push(v1);
                f.push(v2);
            }

            op::IADD..=op::LXOR => {
                let result = self.fold_arithmetic(o, &mut f)?;
                f.push(result);
            }

            op::I2L..=op::I2S => {
                let v = f.pop()?;
                f.push(convert(o, &v));
            }

            op::LCMP | op::FCMPL | op::FCMPG | op::DCMPL | op::DCMPG => {
                let b = f.pop()?;
                let a = f.pop()?;
                f.push(compare(o, &a, &b));
            }

            op::IRETURN..=op::RETURN => return Ok(Flow::stop()),
            op::ATHROW => {
                let v = f.pop()?;
                self.escape(&v);
                return Ok(Flow::stop());
            }

            op::MONITORENTER | op::MONITOREXIT => {
                f.pop()?;
            }

            other => {
                return Err(Error::Analysis(format!(
                    "unexpected zero-operand opcode {other:#x}"
                )))
            }
        }
        Ok(Flow::next(f))
    }

    fn field_load(&self, owner: &str, name: &str, desc: &str, ty: &JvmType) -> ConstantValue {
        self.handler
            .field_value(owner, name, desc)
            .map_or_else(|| ConstantValue::unknown_of(ty), ConstantValue::known)
    }

    fn alloc_array(&mut self, len: &ConstantValue, default: &Constant) -> ConstantValue {
        match len.value() {
            Some(Constant::Int(n)) if (0..=MAX_TRACKED_ARRAY).contains(n) => {
                let id: ArrayId = self.arrays.len();
                self.arrays.push(Some(vec![
                    ConstantValue::known(default.clone());
                    *n as usize
                ]));
                ConstantValue::known(Constant::Array(id))
            }
            _ => ConstantValue::unknown(1),
        }
    }

    fn array_load(&self, o: u8, array: &ConstantValue, index: &ConstantValue) -> ConstantValue {
        let elem_size = if o == op::LALOAD || o == op::DALOAD { 2 } else { 1 };
        if let (Some(Constant::Array(id)), Some(Constant::Int(i))) = (array.value(), index.value())
        {
            if let Some(Some(elems)) = self.arrays.get(*id) {
                if let Some(elem) = usize::try_from(*i).ok().and_then(|i| elems.get(i)) {
                    return elem.clone();
                }
            }
        }
        ConstantValue::unknown(elem_size)
    }

    fn array_store(&mut self, array: &ConstantValue, index: &ConstantValue, value: ConstantValue) {
        let Some(Constant::Array(id)) = array.value() else {
            return;
        };
        let id = *id;
        let known_slot = match index.value() {
            Some(Constant::Int(i)) => usize::try_from(*i).ok(),
            _ => None,
        };
        match (known_slot, self.arrays.get_mut(id)) {
            (Some(slot), Some(Some(elems))) if slot < elems.len() => {
                elems[slot] = value;
            }
            // Unknown index or out-of-range store: all bets are off for
            // this allocation.
            (_, Some(entry)) => *entry = None,
            _ => {}
        }
    }

    fn escape(&mut self, value: &ConstantValue) {
        if let Some(Constant::Array(id)) = value.value() {
            if let Some(entry) = self.arrays.get_mut(*id) {
                *entry = None;
            }
        }
    }

    fn fold_arithmetic(&mut self, o: u8, f: &mut Frame) -> Result<ConstantValue> {
        use ConstantValue as CV;

        // INEG..DNEG are unary; everything else in the range pops two.
        if (op::INEG..=op::DNEG).contains(&o) {
            let v = f.pop()?;
            return Ok(match (o, v.value()) {
                (op::INEG, Some(Constant::Int(a))) => CV::known(Constant::Int(a.wrapping_neg())),
                (op::LNEG, Some(Constant::Long(a))) => CV::known(Constant::Long(a.wrapping_neg())),
                (op::FNEG, Some(Constant::Float(a))) => CV::known(Constant::Float(-a)),
                (op::DNEG, Some(Constant::Double(a))) => CV::known(Constant::Double(-a)),
                (op::INEG | op::FNEG, _) => CV::unknown(1),
                _ => CV::unknown(2),
            });
        }

        let b = f.pop()?;
        let a = f.pop()?;
        let result_size = match o {
            op::LADD | op::LSUB | op::LMUL | op::LDIV | op::LREM | op::LSHL | op::LSHR
            | op::LUSHR | op::LAND | op::LOR | op::LXOR | op::DADD | op::DSUB | op::DMUL
            | op::DDIV | op::DREM => 2,
            _ => 1,
        };
        let (Some(ca), Some(cb)) = (a.value(), b.value()) else {
            return Ok(CV::unknown(result_size));
        };

        let folded = match o {
            op::IADD => int2(ca, cb, i32::wrapping_add),
            op::ISUB => int2(ca, cb, i32::wrapping_sub),
            op::IMUL => int2(ca, cb, i32::wrapping_mul),
            op::IDIV => checked_int2(ca, cb, i32::checked_div),
            op::IREM => checked_int2(ca, cb, i32::checked_rem),
            op::IAND => int2(ca, cb, |a, b| a & b),
            op::IOR => int2(ca, cb, |a, b| a | b),
            op::IXOR => int2(ca, cb, |a, b| a ^ b),
            op::ISHL => int2(ca, cb, |a, b| a.wrapping_shl(b as u32 & 31)),
            op::ISHR => int2(ca, cb, |a, b| a.wrapping_shr(b as u32 & 31)),
            op::IUSHR => int2(ca, cb, |a, b| {
                ((a as u32).wrapping_shr(b as u32 & 31)) as i32
            }),

            op::LADD => long2(ca, cb, i64::wrapping_add),
            op::LSUB => long2(ca, cb, i64::wrapping_sub),
            op::LMUL => long2(ca, cb, i64::wrapping_mul),
            op::LDIV => checked_long2(ca, cb, i64::checked_div),
            op::LREM => checked_long2(ca, cb, i64::checked_rem),
            op::LAND => long2(ca, cb, |a, b| a & b),
            op::LOR => long2(ca, cb, |a, b| a | b),
            op::LXOR => long2(ca, cb, |a, b| a ^ b),
            op::LSHL => long_shift(ca, cb, |a, s| a.wrapping_shl(s)),
            op::LSHR => long_shift(ca, cb, |a, s| a.wrapping_shr(s)),
            op::LUSHR => long_shift(ca, cb, |a, s| ((a as u64).wrapping_shr(s)) as i64),

            op::FADD => float2(ca, cb, |a, b| a + b),
            op::FSUB => float2(ca, cb, |a, b| a - b),
            op::FMUL => float2(ca, cb, |a, b| a * b),
            op::FDIV => float2(ca, cb, |a, b| a / b),
            op::FREM => float2(ca, cb, |a, b| a % b),
            op::DADD => double2(ca, cb, |a, b| a + b),
            op::DSUB => double2(ca, cb, |a, b| a - b),
            op::DMUL => double2(ca, cb, |a, b| a * b),
            op::DDIV => double2(ca, cb, |a, b| a / b),
            op::DREM => double2(ca, cb, |a, b| a % b),

            _ => None,
        };
        Ok(folded.map_or_else(|| CV::unknown(result_size), CV::known))
    }
}

fn int2(a: &Constant, b: &Constant, f: impl Fn(i32, i32) -> i32) -> Option<Constant> {
    Some(Constant::Int(f(a.as_int()?, b.as_int()?)))
}

fn checked_int2(
    a: &Constant,
    b: &Constant,
    f: impl Fn(i32, i32) -> Option<i32>,
) -> Option<Constant> {
    f(a.as_int()?, b.as_int()?).map(Constant::Int)
}

fn long2(a: &Constant, b: &Constant, f: impl Fn(i64, i64) -> i64) -> Option<Constant> {
    Some(Constant::Long(f(a.as_long()?, b.as_long()?)))
}

fn checked_long2(
    a: &Constant,
    b: &Constant,
    f: impl Fn(i64, i64) -> Option<i64>,
) -> Option<Constant> {
    f(a.as_long()?, b.as_long()?).map(Constant::Long)
}

fn long_shift(a: &Constant, b: &Constant, f: impl Fn(i64, u32) -> i64) -> Option<Constant> {
    // The shift distance of the long forms is an int on the stack.
    Some(Constant::Long(f(a.as_long()?, (b.as_int()? as u32) & 63)))
}

fn float2(a: &Constant, b: &Constant, f: impl Fn(f32, f32) -> f32) -> Option<Constant> {
    match (a, b) {
        (Constant::Float(a), Constant::Float(b)) => Some(Constant::Float(f(*a, *b))),
        _ => None,
    }
}

fn double2(a: &Constant, b: &Constant, f: impl Fn(f64, f64) -> f64) -> Option<Constant> {
    match (a, b) {
        (Constant::Double(a), Constant::Double(b)) => Some(Constant::Double(f(*a, *b))),
        _ => None,
    }
}

fn convert(o: u8, v: &ConstantValue) -> ConstantValue {
    use ConstantValue as CV;

    let out_size = match o {
        op::I2L | op::I2D | op::F2L | op::F2D | op::L2D | op::D2L => 2,
        _ => 1,
    };
    let Some(c) = v.value() else {
        return CV::unknown(out_size);
    };
    let folded = match (o, c) {
        (op::I2L, Constant::Int(v)) => Some(Constant::Long(i64::from(*v))),
        (op::I2F, Constant::Int(v)) => Some(Constant::Float(*v as f32)),
        (op::I2D, Constant::Int(v)) => Some(Constant::Double(f64::from(*v))),
        (op::L2I, Constant::Long(v)) => Some(Constant::Int(*v as i32)),
        (op::L2F, Constant::Long(v)) => Some(Constant::Float(*v as f32)),
        (op::L2D, Constant::Long(v)) => Some(Constant::Double(*v as f64)),
        (op::F2I, Constant::Float(v)) => Some(Constant::Int(*v as i32)),
        (op::F2L, Constant::Float(v)) => Some(Constant::Long(*v as i64)),
        (op::F2D, Constant::Float(v)) => Some(Constant::Double(f64::from(*v))),
        (op::D2I, Constant::Double(v)) => Some(Constant::Int(*v as i32)),
        (op::D2L, Constant::Double(v)) => Some(Constant::Long(*v as i64)),
        (op::D2F, Constant::Double(v)) => Some(Constant::Float(*v as f32)),
        (op::I2B, Constant::Int(v)) => Some(Constant::Int(i32::from(*v as i8))),
        (op::I2C, Constant::Int(v)) => Some(Constant::Int(i32::from(*v as u16))),
        (op::I2S, Constant::Int(v)) => Some(Constant::Int(i32::from(*v as i16))),
        _ => None,
    };
    folded.map_or_else(|| CV::unknown(out_size), CV::known)
}

fn compare(o: u8, a: &ConstantValue, b: &ConstantValue) -> ConstantValue {
    use std::cmp::Ordering;
    use ConstantValue as CV;

    let ordering = match (o, a.value(), b.value()) {
        (op::LCMP, Some(Constant::Long(a)), Some(Constant::Long(b))) => Some(a.cmp(b)),
        (op::FCMPL | op::FCMPG, Some(Constant::Float(a)), Some(Constant::Float(b))) => {
            match a.partial_cmp(b) {
                Some(ord) => Some(ord),
                None if o == op::FCMPG => Some(Ordering::Greater),
                None => Some(Ordering::Less),
            }
        }
        (op::DCMPL | op::DCMPG, Some(Constant::Double(a)), Some(Constant::Double(b))) => {
            match a.partial_cmp(b) {
                Some(ord) => Some(ord),
                None if o == op::DCMPG => Some(Ordering::Greater),
                None => Some(Ordering::Less),
            }
        }
        _ => None,
    };
    ordering.map_or_else(
        || CV::unknown(1),
        |ord| CV::known(Constant::Int(ord as i32)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{opcodes::*, Access, LdcConst};

    fn analyze_body(insns: Vec<Insn>) -> Vec<Option<Frame>> {
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = insns;
        analyze(&m, &NoConstantReferences).unwrap()
    }

    #[test]
    fn tracks_constants_through_arithmetic() {
        let frames = analyze_body(vec![
            Insn::Simple { op: ICONST_4 },
            Insn::push_int(10),
            Insn::Simple { op: IMUL },
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },
        ]);
        // Frame before POP holds the folded product.
        let frame = frames[3].as_ref().unwrap();
        assert_eq!(
            frame.peek(0).unwrap().value(),
            Some(&Constant::Int(40))
        );
    }

    #[test]
    fn join_of_distinct_values_is_unknown() {
        // if (?) x = 1 else x = 2; merge point must see Unknown.
        let body = vec![
            Insn::Simple { op: ICONST_0 },  // 0 (phony condition)
            Insn::Jump { op: IFEQ, target: 0 },
            Insn::Simple { op: ICONST_1 },  // 2
            Insn::Var { op: ISTORE, var: 0 },
            Insn::Jump { op: GOTO, target: 1 },
            Insn::Label(0),                 // 5
            Insn::Simple { op: ICONST_2 },
            Insn::Var { op: ISTORE, var: 0 },
            Insn::Label(1),                 // 8
            Insn::Simple { op: RETURN },
        ];
        let frames = analyze_body(body);
        let merged = frames[9].as_ref().unwrap();
        assert!(!merged.local(0).unwrap().is_known());
    }

    #[test]
    fn dead_code_has_no_frames() {
        let frames = analyze_body(vec![
            Insn::Jump { op: GOTO, target: 0 },
            Insn::Simple { op: NOP }, // unreachable
            Insn::Label(0),
            Insn::Simple { op: RETURN },
        ]);
        assert!(frames[1].is_none());
        assert!(frames[2].is_some());
    }

    #[test]
    fn tracked_array_contents() {
        let body = vec![
            Insn::push_int(3),
            Insn::IntOp { op: NEWARRAY, operand: array_type::T_INT },
            Insn::Simple { op: DUP },
            Insn::push_int(1),
            Insn::push_int(99),
            Insn::Simple { op: IASTORE },
            Insn::Simple { op: DUP },
            Insn::push_int(1),
            Insn::Simple { op: IALOAD },  // 8: loads the stored 99
            Insn::Simple { op: POP },
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },  // 11
        ];
        let frames = analyze_body(body);
        let frame = frames[9].as_ref().unwrap();
        assert_eq!(frame.peek(0).unwrap().value(), Some(&Constant::Int(99)));
    }

    #[test]
    fn escaped_array_is_poisoned() {
        let body = vec![
            Insn::push_int(2),
            Insn::IntOp { op: NEWARRAY, operand: array_type::T_INT },
            Insn::Simple { op: DUP },
            Insn::Field {
                op: PUTSTATIC,
                owner: "A".into(),
                name: "arr".into(),
                desc: "[I".into(),
            },
            Insn::push_int(0),
            Insn::Simple { op: IALOAD },
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN }, // 7
        ];
        let frames = analyze_body(body);
        let frame = frames[6].as_ref().unwrap();
        assert!(!frame.peek(0).unwrap().is_known());
    }

    #[test]
    fn handler_entry_receives_single_unknown_stack() {
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = vec![
            Insn::Label(0),
            Insn::Simple { op: ICONST_1 },
            Insn::Simple { op: POP },
            Insn::Label(1),
            Insn::Simple { op: RETURN },
            Insn::Label(2), // handler
            Insn::Simple { op: POP },
            Insn::Simple { op: RETURN },
        ];
        m.try_catch_blocks.push(crate::ir::TryCatchBlock {
            start: 0,
            end: 1,
            handler: 2,
            catch_type: None,
        });
        let frames = analyze(&m, &NoConstantReferences).unwrap();
        let handler = frames[5].as_ref().unwrap();
        assert_eq!(handler.stack_size(), 1);
        assert!(!handler.peek(0).unwrap().is_known());
    }

    #[test]
    fn ldc_and_reference_handler() {
        struct Fields;
        impl ConstantReferenceHandler for Fields {
            fn field_value(&self, owner: &str, name: &str, _desc: &str) -> Option<Constant> {
                (owner == "A" && name == "K").then(|| Constant::Long(0x1122))
            }
        }
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = vec![
            Insn::Field {
                op: GETSTATIC,
                owner: "A".into(),
                name: "K".into(),
                desc: "J".into(),
            },
            Insn::Ldc { constant: LdcConst::Long(0xFF) },
            Insn::Simple { op: LXOR },
            Insn::Simple { op: POP2 },
            Insn::Simple { op: RETURN },
        ];
        let frames = analyze(&m, &Fields).unwrap();
        let frame = frames[3].as_ref().unwrap();
        assert_eq!(
            frame.peek(0).unwrap().value(),
            Some(&Constant::Long(0x1122 ^ 0xFF))
        );
    }

    #[test]
    fn rejects_stack_height_conflicts() {
        let mut m = MethodNode::new(Access::STATIC, "m", "()V");
        m.insns = vec![
            Insn::Simple { op: ICONST_0 },
            Insn::Jump { op: IFEQ, target: 0 },
            Insn::Simple { op: ICONST_1 }, // extra value on one path only
            Insn::Label(0),
            Insn::Simple { op: RETURN },
        ];
        assert!(analyze(&m, &NoConstantReferences).is_err());
    }
}
