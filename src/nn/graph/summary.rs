/*
 * @Date         : 2026-02-09
 * @Description  : 图的文本摘要：按求值顺序列出各节点的类型、输出类型、参数量与输入
 */

use super::Graph;
use crate::nn::nodes::TraitNode;

const HEADERS: [&str; 5] = ["节点名称", "类型", "输出类型", "参数量", "输入"];

impl Graph {
    /// 返回模型摘要（Unicode文本表格），含自动插入的适配器；冻结节点的名称后带`*`
    ///
    /// ```ignore
    /// println!("{}", graph.summary());
    /// // ┌──────────┬────────┬─────────────────┬────────┬──────┐
    /// // │ 节点名称 │ 类型   │ 输出类型        │ 参数量 │ 输入 │
    /// // ├──────────┼────────┼─────────────────┼────────┼──────┤
    /// // │ in       │ Input  │ FeedForward(4)  │      - │ -    │
    /// // ...
    /// ```
    pub fn summary(&self) -> String {
        let rows = self
            .nodes
            .iter()
            .map(|node| {
                let count = node.param_range().len();
                let inputs = if node.inputs.is_empty() {
                    "-".to_string()
                } else {
                    node.inputs
                        .iter()
                        .map(|&i| self.nodes[i].name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                [
                    if node.frozen {
                        format!("{}*", node.name)
                    } else {
                        node.name.clone()
                    },
                    node.node.type_name().to_string(),
                    node.output_type.to_string(),
                    if count == 0 {
                        "-".to_string()
                    } else {
                        format_number(count)
                    },
                    inputs,
                ]
            })
            .collect::<Vec<_>>();

        let mut widths = HEADERS.map(display_width);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(display_width(cell));
            }
        }

        let mut out = String::new();
        out.push_str(&rule(&widths, '┌', '┬', '┐'));
        out.push_str(&line(&HEADERS.map(String::from), &widths));
        out.push_str(&rule(&widths, '├', '┼', '┤'));
        for row in &rows {
            out.push_str(&line(row, &widths));
        }
        out.push_str(&rule(&widths, '├', '┴', '┤'));

        let inner = widths.iter().map(|w| w + 3).sum::<usize>() - 3;
        let total = self.num_params();
        let trainable = self
            .trainable_ranges()
            .iter()
            .map(|r| r.len())
            .sum::<usize>();
        for text in [
            format!("总参数量: {}", format_number(total)),
            format!("可训练参数: {}", format_number(trainable)),
            format!("已训练步数: {}", self.iteration_count()),
        ] {
            out.push_str(&format!("│ {} │\n", pad(&text, inner)));
        }
        out.push_str(&format!("└{}┘\n", "─".repeat(inner + 2)));
        out
    }
}

fn rule(widths: &[usize; 5], left: char, mid: char, right: char) -> String {
    let segments = widths
        .iter()
        .map(|w| "─".repeat(w + 2))
        .collect::<Vec<_>>()
        .join(&mid.to_string());
    format!("{left}{segments}{right}\n")
}

/// 参数量一列右对齐，其余左对齐
fn line(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let cells = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(col, (cell, &w))| {
            if col == 3 {
                format!("{}{cell}", " ".repeat(w - display_width(cell)))
            } else {
                pad(cell, w)
            }
        })
        .collect::<Vec<_>>();
    format!("│ {} │\n", cells.join(" │ "))
}

fn pad(text: &str, width: usize) -> String {
    format!("{text}{}", " ".repeat(width.saturating_sub(display_width(text))))
}

/// 中文字符按两格计
fn display_width(s: &str) -> usize {
    s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

/// 千分位分隔
fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
