//! # Only Graph
//!
//! `only_graph`项目用纯rust实现一个可任意连接的神经网络计算图（多输入、多输出、分支/合并），
//! 负责：节点声明的校验与形状适配器的自动插入、确定性的拓扑求值顺序、带掩码传播的前向/反向执行、
//! 统一的扁平参数/梯度缓冲，以及冻结子图（特征提取器）形式的迁移学习和多实例参数平均。
//!

pub mod errors;
pub mod nn;
pub mod tensor;
pub mod utils;
