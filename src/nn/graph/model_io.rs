/*
 * @Date         : 2026-02-07
 * @Description  : 模型保存/加载
 *
 * 一个模型由两个文件组成：
 * - `{path}.json`：图的描述符（可读，可用于重建结构）
 * - `{path}.bin`：扁平参数缓冲（bincode编码，带魔数与版本号）
 */

use super::{Graph, GraphError};
use crate::nn::descriptor::GraphDescriptor;
use crate::nn::nodes::NodeRegistry;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const PARAMS_MAGIC: [u8; 4] = *b"OGPB";
const PARAMS_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ParamsFile {
    magic: [u8; 4],
    version: u32,
    params: Vec<f32>,
}

fn io_error(what: &str, path: &Path, e: impl std::fmt::Display) -> GraphError {
    GraphError::Serialization(format!("{what}`{}`失败：{e}", path.display()))
}

impl Graph {
    /// 只保存扁平参数缓冲
    pub fn save_params<P: AsRef<Path>>(&self, path: P) -> Result<(), GraphError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| io_error("创建参数文件", path, e))?;
        let content = ParamsFile {
            magic: PARAMS_MAGIC,
            version: PARAMS_VERSION,
            params: self.params.clone(),
        };
        bincode::serialize_into(BufWriter::new(file), &content)
            .map_err(|e| io_error("写入参数文件", path, e))
    }

    /// 把参数文件载入到结构相同的图中；参数个数不符时报错，原参数保持不变
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<(), GraphError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| io_error("打开参数文件", path, e))?;
        let content: ParamsFile = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| io_error("解析参数文件", path, e))?;
        if content.magic != PARAMS_MAGIC {
            return Err(GraphError::Serialization(format!(
                "`{}`不是参数文件",
                path.display()
            )));
        }
        if content.version != PARAMS_VERSION {
            return Err(GraphError::Serialization(format!(
                "不支持的参数文件版本{}（当前版本为{PARAMS_VERSION}）",
                content.version
            )));
        }
        self.set_flat_params(&content.params)
    }

    /// 保存完整模型：生成`{path}.json`与`{path}.bin`
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), GraphError> {
        let path = path.as_ref();
        let json_path = path.with_extension("json");
        let bin_path = path.with_extension("bin");
        self.save_params(&bin_path)?;
        std::fs::write(&json_path, self.to_json()?)
            .map_err(|e| io_error("写入描述文件", &json_path, e))?;
        info!(graph = %self.name(), path = %path.display(), "模型已保存");
        Ok(())
    }

    /// 由`{path}.json`重建图结构并载入`{path}.bin`中的参数（只能含内置节点类型）
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        Self::load_model_with_registry(path, Arc::new(NodeRegistry::new()))
    }

    /// 同`load_model`，自定义节点类型通过`registry`解析
    pub fn load_model_with_registry<P: AsRef<Path>>(
        path: P,
        registry: Arc<NodeRegistry>,
    ) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let json_path = path.with_extension("json");
        let json = std::fs::read_to_string(&json_path)
            .map_err(|e| io_error("读取描述文件", &json_path, e))?;
        let mut graph = Self::build_with_registry(GraphDescriptor::from_json(&json)?, registry)?;
        graph.load_params(path.with_extension("bin"))?;
        info!(graph = %graph.name(), path = %path.display(), "模型已加载");
        Ok(graph)
    }
}
