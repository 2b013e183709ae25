/*
 * @Date         : 2026-02-03
 * @Description  : 张量的打印：数据部分交给`ndarray`排版（元素过多时自动省略中间部分），末尾附上形状，
 *                 便于在日志中查看激活值、梯度与掩码
 */

use crate::tensor::Tensor;
use std::fmt;

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision().unwrap_or(4);
        writeln!(f, "{:.*}", precision, self.data)?;
        write!(f, "形状: {:?}", self.shape())
    }
}
