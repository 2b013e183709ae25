/*
 * @Date         : 2026-02-05
 * @Description  : 输入节点：图的数据入口，只做形状校验
 */

use crate::nn::nodes::{BackwardContext, Backprop, ForwardContext, ParamView, TraitNode};
use crate::nn::{GraphError, InputType, ShapeKind};
use crate::tensor::Tensor;

/// 输入节点：没有输入边，前向时接收外部数据并校验其形状
#[derive(Debug, Clone)]
pub(crate) struct Input {
    input_type: InputType,
}

impl Input {
    pub(crate) const fn new(input_type: InputType) -> Self {
        Self { input_type }
    }
}

impl TraitNode for Input {
    fn type_name(&self) -> &str {
        "Input"
    }

    fn input_kind(&self) -> Option<ShapeKind> {
        None
    }

    fn output_type(&mut self, inputs: &[InputType]) -> Result<InputType, GraphError> {
        if !inputs.is_empty() {
            return Err(GraphError::Configuration(
                "Input节点不能有输入边".to_string(),
            ));
        }
        Ok(self.input_type)
    }

    fn forward(
        &mut self,
        inputs: &[&Tensor],
        _params: &ParamView<'_>,
        _ctx: &ForwardContext<'_>,
    ) -> Result<Tensor, GraphError> {
        let [data] = inputs else {
            return Err(GraphError::ComputationError(
                "Input节点需要恰好1个外部数据张量".to_string(),
            ));
        };
        if !self.input_type.matches_shape(data.shape()) {
            return Err(GraphError::ComputationError(format!(
                "输入数据形状{:?}与声明的输入类型{}不符",
                data.shape(),
                self.input_type
            )));
        }
        Ok((*data).clone())
    }

    fn backward(
        &mut self,
        _grad: &Tensor,
        _params: &ParamView<'_>,
        _ctx: &BackwardContext<'_>,
    ) -> Result<Backprop, GraphError> {
        Ok(Backprop::inputs_only(Vec::new()))
    }
}
