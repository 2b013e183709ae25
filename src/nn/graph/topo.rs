/*
 * @Date         : 2026-02-05
 * @Description  : 拓扑排序（Kahn算法，入度计数）
 *
 * 同时可被求值的节点中总是先取声明下标最小的，所以对同一份声明，求值顺序是确定的，
 * 保存/恢复后的图也与原图一致。
 */

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// `inputs[i]`为节点i的所有生产者下标。返回求值顺序；有环时返回无法排序的节点下标（升序）
pub(in crate::nn::graph) fn topological_order(
    inputs: &[Vec<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let n = inputs.len();
    let mut in_degree = inputs.iter().map(Vec::len).collect::<Vec<_>>();
    let mut consumers = vec![Vec::new(); n];
    for (to, producers) in inputs.iter().enumerate() {
        for &from in producers {
            consumers[from].push(to);
        }
    }

    let mut ready = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect::<BinaryHeap<_>>();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &c in &consumers[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                ready.push(Reverse(c));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| in_degree[i] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::topological_order;

    #[test]
    fn test_ties_broken_by_declaration_order() {
        // 0 -> {2, 1}，1与2都可在0之后求值，按声明下标先取1
        let inputs = vec![vec![], vec![0], vec![0], vec![1, 2]];
        assert_eq!(topological_order(&inputs), Ok(vec![0, 1, 2, 3]));

        // 声明顺序在前的节点若依赖靠后的节点，仍需等其生产者
        let inputs = vec![vec![2], vec![], vec![1]];
        assert_eq!(topological_order(&inputs), Ok(vec![1, 2, 0]));
    }

    #[test]
    fn test_cycle_reports_unresolved_nodes() {
        // 0 -> 1 -> 2 -> 1，3依赖环上的2
        let inputs = vec![vec![], vec![0, 2], vec![1], vec![2]];
        assert_eq!(topological_order(&inputs), Err(vec![1, 2, 3]));
    }
}
