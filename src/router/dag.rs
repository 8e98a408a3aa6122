//! Dependency-graph validation and ordering over a batch of tasks.
//!
//! Cycle detection is a DFS with a recursion-stack set, tracking the path
//! taken so a detected cycle can be reported back as a sequence of task ids.

use std::collections::{HashMap, HashSet};

use crate::domain::Task;

/// Validates that `tasks` contains no dependency cycle. Returns the cycle
/// path (a sequence of task ids) on failure.
pub fn validate_dependency_graph<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Result<(), Vec<String>> {
    let task_map: HashMap<&str, &Task> = tasks.into_iter().map(|t| (t.id.as_str(), t)).collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycle_path = Vec::new();

    for task_id in task_map.keys() {
        if !visited.contains(task_id) && has_cycle_dfs(task_id, &task_map, &mut visited, &mut rec_stack, &mut cycle_path) {
            return Err(cycle_path);
        }
    }

    Ok(())
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, &'a Task>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    cycle_path: &mut Vec<String>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    cycle_path.push(node.to_string());

    if let Some(task) = graph.get(node) {
        for dep_id in &task.depends_on {
            if !visited.contains(dep_id.as_str()) {
                if graph.contains_key(dep_id.as_str()) && has_cycle_dfs(dep_id.as_str(), graph, visited, rec_stack, cycle_path) {
                    return true;
                }
            } else if rec_stack.contains(dep_id.as_str()) {
                cycle_path.push(dep_id.clone());
                return true;
            }
        }
    }

    rec_stack.remove(node);
    cycle_path.pop();
    false
}

/// Topologically orders `tasks` (dependencies first). Returns indices into
/// the input slice.
pub fn topological_sort(tasks: &[Task]) -> Result<Vec<usize>, Vec<String>> {
    validate_dependency_graph(tasks)?;

    let index_map: HashMap<&str, usize> = tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

    let mut visited = HashSet::new();
    let mut result = Vec::new();

    for idx in 0..tasks.len() {
        topo_dfs_idx(idx, tasks, &index_map, &mut visited, &mut result);
    }

    Ok(result)
}

fn topo_dfs_idx(idx: usize, tasks: &[Task], index_map: &HashMap<&str, usize>, visited: &mut HashSet<usize>, result: &mut Vec<usize>) {
    if visited.contains(&idx) {
        return;
    }
    visited.insert(idx);

    let task = &tasks[idx];
    for dep_id in &task.depends_on {
        if let Some(&dep_idx) = index_map.get(dep_id.as_str()) {
            topo_dfs_idx(dep_idx, tasks, index_map, visited, result);
        }
    }
    result.push(idx);
}

/// Groups `tasks` into dependency levels: level 0 has no unresolved
/// dependencies within the batch, level 1 depends only on level 0, etc. Used
/// by `run_parallel` to fan out each level concurrently while respecting
/// ordering across levels.
pub fn dependency_levels(tasks: &[Task]) -> Result<Vec<Vec<usize>>, Vec<String>> {
    validate_dependency_graph(tasks)?;

    let index_map: HashMap<&str, usize> = tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
    let mut level_of = vec![None; tasks.len()];

    fn level_for(idx: usize, tasks: &[Task], index_map: &HashMap<&str, usize>, level_of: &mut Vec<Option<usize>>) -> usize {
        if let Some(level) = level_of[idx] {
            return level;
        }
        let task = &tasks[idx];
        let level = task
            .depends_on
            .iter()
            .filter_map(|dep| index_map.get(dep.as_str()))
            .map(|&dep_idx| level_for(dep_idx, tasks, index_map, level_of) + 1)
            .max()
            .unwrap_or(0);
        level_of[idx] = Some(level);
        level
    }

    let mut max_level = 0;
    let mut levels_by_idx = vec![0; tasks.len()];
    for idx in 0..tasks.len() {
        let level = level_for(idx, tasks, &index_map, &mut level_of);
        levels_by_idx[idx] = level;
        max_level = max_level.max(level);
    }

    let mut levels = vec![Vec::new(); max_level + 1];
    for (idx, level) in levels_by_idx.into_iter().enumerate() {
        levels[level].push(idx);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskKind};

    fn task_with_id(id: &str, deps: &[&str]) -> Task {
        let mut task = Task::new(TaskKind::ToolCall, Priority::Normal);
        task.id = id.to_string();
        task.depends_on = deps.iter().map(|s| s.to_string()).collect();
        task
    }

    #[test]
    fn test_no_cycle() {
        let tasks = vec![task_with_id("a", &[]), task_with_id("b", &["a"]), task_with_id("c", &["a", "b"])];
        assert!(validate_dependency_graph(&tasks).is_ok());
    }

    #[test]
    fn test_direct_cycle_detected() {
        let tasks = vec![task_with_id("a", &["b"]), task_with_id("b", &["a"])];
        assert!(validate_dependency_graph(&tasks).is_err());
    }

    #[test]
    fn test_self_cycle_detected() {
        let tasks = vec![task_with_id("a", &["a"])];
        assert!(validate_dependency_graph(&tasks).is_err());
    }

    #[test]
    fn test_topological_sort_respects_dependencies() {
        let tasks = vec![task_with_id("c", &["a", "b"]), task_with_id("a", &[]), task_with_id("b", &["a"])];
        let order = topological_sort(&tasks).unwrap();
        let pos = |id: &str| order.iter().position(|&i| tasks[i].id == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn test_dependency_levels_groups_independent_tasks() {
        let tasks = vec![task_with_id("a", &[]), task_with_id("b", &[]), task_with_id("c", &["a", "b"])];
        let levels = dependency_levels(&tasks).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].len(), 2);
        assert_eq!(levels[1].len(), 1);
    }
}
