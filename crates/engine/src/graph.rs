//! 필드 의존성 그래프
//!
//! 노드는 인덱스 배열, 간선은 (참조됨 → 참조함) 인덱스 쌍으로 저장하는
//! 아레나 방식 그래프입니다. 위상 정렬은 Kahn 알고리즘을 사용하며,
//! 동시에 준비된 노드는 인덱스가 작은 것부터 꺼내 선언 순서를 최대한 보존합니다.

use std::collections::BTreeSet;

/// 방향 그래프
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    node_count: usize,
    edges: Vec<(usize, usize)>,
}

impl DependencyGraph {
    /// `node_count`개의 노드를 가진 빈 그래프를 만듭니다.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            edges: Vec::new(),
        }
    }

    /// 노드 수
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// `from`이 `to`보다 먼저 평가되어야 함을 나타내는 간선을 추가합니다.
    ///
    /// 같은 간선은 한 번만 저장됩니다.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        debug_assert!(from < self.node_count && to < self.node_count);
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    /// 간선 수
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// 위상 정렬 순서를 반환합니다.
    ///
    /// 순환이 있으면 순환 위에 있는 노드 하나를 `Err`로 반환합니다.
    pub fn topological_order(&self) -> Result<Vec<usize>, usize> {
        let n = self.node_count;
        let mut indegree = vec![0usize; n];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(from, to) in &self.edges {
            indegree[to] += 1;
            outgoing[from].push(to);
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &next in &outgoing[node] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }
        Err(self.find_cycle_node(&indegree))
    }

    /// 정렬 후에도 진입 차수가 남은 노드들 중 실제 순환 위의 노드를 찾습니다.
    ///
    /// 남은 노드는 모두 남은 선행 노드를 가지므로, 선행 노드를 거슬러 올라가면
    /// 반드시 이미 방문한 노드를 다시 만나고 그 노드는 순환 위에 있습니다.
    fn find_cycle_node(&self, indegree: &[usize]) -> usize {
        let remaining = |i: usize| indegree[i] > 0;
        let Some(start) = (0..self.node_count).find(|&i| remaining(i)) else {
            return 0;
        };
        let mut visited = vec![false; self.node_count];
        let mut current = start;
        loop {
            if visited[current] {
                return current;
            }
            visited[current] = true;
            match self
                .edges
                .iter()
                .find(|&&(from, to)| to == current && remaining(from))
            {
                Some(&(from, _)) => current = from,
                None => return current,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_edges_keeps_declaration_order() {
        let graph = DependencyGraph::new(4);
        assert_eq!(graph.topological_order().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn dependency_moves_before_dependent() {
        // 0(Message) depends on 1(Body)
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(1, 0);
        assert_eq!(graph.topological_order().unwrap(), vec![1, 0]);
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(0, 1);
        graph.add_edge(0, 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn cycle_reports_node_on_cycle() {
        // 0 -> 1 -> 2 -> 1, 3 independent, 4 depends on 2
        let mut graph = DependencyGraph::new(5);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        graph.add_edge(2, 4);
        let node = graph.topological_order().unwrap_err();
        assert!(node == 1 || node == 2, "node {node} is not on the cycle");
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(1, 1);
        assert_eq!(graph.topological_order().unwrap_err(), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn acyclic_graphs_sort_topologically(
                n in 1usize..24,
                raw_edges in proptest::collection::vec((0usize..24, 0usize..24), 0..64),
            ) {
                // 작은 인덱스 -> 큰 인덱스 간선만 사용하면 항상 DAG
                let mut graph = DependencyGraph::new(n);
                let mut edges = Vec::new();
                for (a, b) in raw_edges {
                    let (a, b) = (a % n, b % n);
                    if a < b {
                        graph.add_edge(b, a);
                        edges.push((b, a));
                    }
                }
                let order = graph.topological_order().unwrap();
                prop_assert_eq!(order.len(), n);
                let mut pos = vec![0usize; n];
                for (i, &node) in order.iter().enumerate() {
                    pos[node] = i;
                }
                for (from, to) in edges {
                    prop_assert!(pos[from] < pos[to]);
                }
            }

            #[test]
            fn cycles_always_fail(n in 2usize..16, start in 0usize..16) {
                let mut graph = DependencyGraph::new(n);
                for i in 0..n {
                    graph.add_edge(i, (i + 1) % n);
                }
                graph.add_edge(start % n, (start + 1) % n);
                let node = graph.topological_order().unwrap_err();
                prop_assert!(node < n);
            }
        }
    }
}
