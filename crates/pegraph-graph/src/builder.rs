use pegraph_core::{
    Assumption, BinaryOp, BuildRequest, GraphBuilder, GraphError, Instruction, NodeId, NodeKind,
    ResolvedMethod, Result, StructuredGraph,
};
use tracing::{debug, instrument};

/// Parses stack bytecode into a graph by abstract interpretation of the
/// operand stack and locals.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytecodeGraphBuilder;

impl BytecodeGraphBuilder {
    pub fn new() -> Self {
        Self
    }
}

struct FrameState {
    locals: Vec<Option<NodeId>>,
    stack: Vec<NodeId>,
}

impl FrameState {
    fn pop(&mut self, bci: usize) -> std::result::Result<NodeId, String> {
        self.stack
            .pop()
            .ok_or_else(|| format!("operand stack underflow at bci {}", bci))
    }

    fn local(&self, index: u16, bci: usize) -> std::result::Result<NodeId, String> {
        match self.locals.get(index as usize) {
            None => Err(format!("local {} out of range at bci {}", index, bci)),
            Some(None) => Err(format!("read of uninitialized local {} at bci {}", index, bci)),
            Some(Some(node)) => Ok(*node),
        }
    }

    fn store(&mut self, index: u16, value: NodeId, bci: usize) -> std::result::Result<(), String> {
        let slot = self
            .locals
            .get_mut(index as usize)
            .ok_or_else(|| format!("local {} out of range at bci {}", index, bci))?;
        *slot = Some(value);
        Ok(())
    }
}

impl<M: ResolvedMethod> GraphBuilder<M> for BytecodeGraphBuilder {
    #[instrument(skip_all, fields(method = %graph.method()))]
    fn build(
        &self,
        mut graph: StructuredGraph<M>,
        request: &BuildRequest<'_, M>,
    ) -> Result<StructuredGraph<M>> {
        let method = graph.method().clone();
        let source = request.code_source();
        let code = source
            .code(&method)?
            .ok_or_else(|| GraphError::MissingBytecode(method.to_string()))?;

        if let Some(ctx) = request.intrinsic {
            graph.set_intrinsic_origin(ctx.bytecode.name());
        }
        if code.len() > request.config.max_bytecode_size {
            return Err(GraphError::malformed(
                &method,
                format!(
                    "{} instructions exceed the limit of {}",
                    code.len(),
                    request.config.max_bytecode_size
                ),
            ));
        }
        debug!(
            "Parsing {} instructions from {}",
            code.len(),
            source.name()
        );

        if code.parameters > code.max_locals {
            return Err(GraphError::malformed(
                &method,
                format!(
                    "{} parameters do not fit in {} locals",
                    code.parameters, code.max_locals
                ),
            ));
        }

        let mut frame = FrameState {
            locals: vec![None; code.max_locals as usize],
            stack: Vec::new(),
        };
        for index in 0..code.parameters {
            let param = graph.add_node(NodeKind::Parameter(index), vec![]);
            frame.locals[index as usize] = Some(param);
        }

        let malformed = |reason: String| GraphError::malformed(&method, reason);

        for (bci, insn) in code.instructions.iter().enumerate() {
            // Every non-binary instruction continues or returns from its arm.
            let op = match insn {
                Instruction::Add => BinaryOp::Add,
                Instruction::Sub => BinaryOp::Sub,
                Instruction::Mul => BinaryOp::Mul,
                Instruction::Div => BinaryOp::Div,
                Instruction::Rem => BinaryOp::Rem,
                Instruction::And => BinaryOp::And,
                Instruction::Or => BinaryOp::Or,
                Instruction::Xor => BinaryOp::Xor,
                Instruction::Shl => BinaryOp::Shl,
                Instruction::Shr => BinaryOp::Shr,
                Instruction::Const(value) => {
                    let node = graph.add_node(NodeKind::Constant(*value), vec![]);
                    frame.stack.push(node);
                    continue;
                }
                Instruction::Load(index) => {
                    let node = frame.local(*index, bci).map_err(malformed)?;
                    frame.stack.push(node);
                    continue;
                }
                Instruction::Store(index) => {
                    let value = frame.pop(bci).map_err(malformed)?;
                    frame.store(*index, value, bci).map_err(malformed)?;
                    continue;
                }
                Instruction::Neg => {
                    let x = frame.pop(bci).map_err(malformed)?;
                    let node = graph.add_node(NodeKind::Negate, vec![x]);
                    frame.stack.push(node);
                    continue;
                }
                Instruction::Dup => {
                    let top = *frame
                        .stack
                        .last()
                        .ok_or_else(|| malformed(format!("operand stack underflow at bci {}", bci)))?;
                    frame.stack.push(top);
                    continue;
                }
                Instruction::Pop => {
                    frame.pop(bci).map_err(malformed)?;
                    continue;
                }
                Instruction::Invoke {
                    callee,
                    argc,
                    virtual_call,
                } => {
                    let argc = *argc as usize;
                    if frame.stack.len() < argc {
                        return Err(malformed(format!(
                            "invoke of {} needs {} arguments but the stack holds {} at bci {}",
                            callee,
                            argc,
                            frame.stack.len(),
                            bci
                        )));
                    }
                    let args = frame.stack.split_off(frame.stack.len() - argc);
                    let direct = !*virtual_call
                        || (request.optimistic.devirtualize_invokes
                            && graph.record_assumption(Assumption::ConcreteMethod {
                                callee: callee.clone(),
                            }));
                    let node = graph.add_node(
                        NodeKind::Invoke {
                            callee: callee.clone(),
                            direct,
                        },
                        args,
                    );
                    frame.stack.push(node);
                    continue;
                }
                Instruction::Return => {
                    let value = frame.pop(bci).map_err(malformed)?;
                    graph.add_node(NodeKind::Return { has_value: true }, vec![value]);
                    return Ok(graph);
                }
                Instruction::ReturnVoid => {
                    if request.config.strict_stack_discipline && !frame.stack.is_empty() {
                        return Err(malformed(format!(
                            "{} values left on the stack at bci {}",
                            frame.stack.len(),
                            bci
                        )));
                    }
                    graph.add_node(NodeKind::Return { has_value: false }, vec![]);
                    return Ok(graph);
                }
            };

            let y = frame.pop(bci).map_err(malformed)?;
            let x = frame.pop(bci).map_err(malformed)?;
            let node = graph.add_node(NodeKind::Binary(op), vec![x, y]);
            frame.stack.push(node);
        }

        Err(malformed(
            "execution falls off the end of the code without returning".to_string(),
        ))
    }
}
