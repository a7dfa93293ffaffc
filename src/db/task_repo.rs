use std::collections::VecDeque;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::graph::{NodeRef, TaskGraph};
use crate::core::validate::MAX_DEPTH;
use crate::error::Result;
use crate::id::{TaskId, UserId};
use crate::types::{Task, TaskRecord};

/// Fixed-width UTC form so text order matches time order
fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(row: &Row, col: &str, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            let idx = row.as_ref().column_index(col).unwrap_or_default();
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

fn get_time(row: &Row, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(col)?;
    parse_time(row, col, &raw)
}

fn get_opt_time(row: &Row, col: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(col)?
        .map(|raw| parse_time(row, col, &raw))
        .transpose()
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task::from_record(TaskRecord {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        deadline: get_time(row, "deadline")?,
        created_at: get_time(row, "created_at")?,
        completed_at: get_opt_time(row, "completed_at")?,
    }))
}

pub fn get_task(conn: &Connection, id: &TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1",
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Direct children ordered by creation time, then id
pub fn get_children(conn: &Connection, parent_id: &TaskId) -> Result<Vec<Task>> {
    let mut stmt =
        conn.prepare("SELECT * FROM tasks WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC")?;
    let tasks = stmt
        .query_map(params![parent_id], row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    Ok(tasks)
}

/// Load a task plus its ancestor chain (at most `MAX_DEPTH - 1` hops).
///
/// Returns the graph and the node of the requested task.
pub fn get_with_ancestors(conn: &Connection, id: &TaskId) -> Result<Option<(TaskGraph, NodeRef)>> {
    let Some(task) = get_task(conn, id)? else {
        return Ok(None);
    };

    let mut chain = vec![task];
    while chain.len() < MAX_DEPTH as usize {
        let Some(parent_id) = chain.last().and_then(|t| t.parent_id()).cloned() else {
            break;
        };
        match get_task(conn, &parent_id)? {
            Some(parent) => chain.push(parent),
            None => break,
        }
    }

    let mut graph = TaskGraph::new();
    let mut node = None;
    for task in chain.into_iter().rev() {
        node = Some(graph.insert(task, node));
    }
    tracing::debug!(task = %id, loaded = graph.len(), "loaded ancestor chain");
    Ok(node.map(|node| (graph, node)))
}

/// Load a task plus its full descendant subtree.
pub fn get_with_descendants(
    conn: &Connection,
    id: &TaskId,
) -> Result<Option<(TaskGraph, NodeRef)>> {
    let Some(task) = get_task(conn, id)? else {
        return Ok(None);
    };
    let mut graph = TaskGraph::new();
    let node = graph.insert(task, None);
    attach_descendants(conn, &mut graph, node)?;
    tracing::debug!(task = %id, loaded = graph.len(), "loaded subtree");
    Ok(Some((graph, node)))
}

/// Load a task with both its ancestor chain and its descendant subtree.
pub fn get_with_lineage(conn: &Connection, id: &TaskId) -> Result<Option<(TaskGraph, NodeRef)>> {
    let Some((mut graph, node)) = get_with_ancestors(conn, id)? else {
        return Ok(None);
    };
    attach_descendants(conn, &mut graph, node)?;
    Ok(Some((graph, node)))
}

fn attach_descendants(conn: &Connection, graph: &mut TaskGraph, node: NodeRef) -> Result<()> {
    let mut queue = VecDeque::from([node]);
    while let Some(current) = queue.pop_front() {
        let Some(id) = graph.task(current).id().cloned() else {
            continue;
        };
        for child in get_children(conn, &id)? {
            queue.push_back(graph.insert(child, Some(current)));
        }
    }
    Ok(())
}

/// Root tasks of a user, soonest deadline first
pub fn list_roots(conn: &Connection, user: UserId, completed: Option<bool>) -> Result<Vec<Task>> {
    let mut sql = String::from("SELECT * FROM tasks WHERE parent_id IS NULL AND user_id = ?1");
    match completed {
        Some(true) => sql.push_str(" AND completed_at IS NOT NULL"),
        Some(false) => sql.push_str(" AND completed_at IS NULL"),
        None => {}
    }
    sql.push_str(" ORDER BY deadline ASC, created_at ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params![user], row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    Ok(tasks)
}

/// Persist every node of `graph`.
///
/// Unsaved nodes get an id and are inserted parents-first, so children pick
/// up the id their parent was just given. Saved nodes have their mutable
/// columns rewritten.
pub fn save(conn: &Connection, graph: &mut TaskGraph) -> Result<()> {
    let nodes: Vec<NodeRef> = graph.node_refs().collect();
    for node in nodes {
        if let Some(parent) = graph.parent(node) {
            let parent_id = graph.task(parent).id().cloned();
            graph.task_mut(node).set_parent_id(parent_id);
        }

        let task = graph.task(node);
        if let Some(id) = task.id() {
            update_task(conn, id, task)?;
            continue;
        }

        let id = TaskId::new();
        insert_task(conn, &id, task)?;
        graph.task_mut(node).assign_id(id);
    }
    Ok(())
}

fn insert_task(conn: &Connection, id: &TaskId, task: &Task) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO tasks (id, parent_id, user_id, title, description, deadline, created_at, completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            id,
            task.parent_id(),
            task.user_id(),
            task.title,
            task.description,
            to_db_time(task.deadline()),
            to_db_time(task.created_at()),
            task.completed_at().map(to_db_time),
        ],
    )?;
    tracing::debug!(task = %id, "task inserted");
    Ok(())
}

fn update_task(conn: &Connection, id: &TaskId, task: &Task) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, deadline = ?3, completed_at = ?4 WHERE id = ?5",
        params![
            task.title,
            task.description,
            to_db_time(task.deadline()),
            task.completed_at().map(to_db_time),
            id,
        ],
    )?;
    Ok(())
}

/// Delete a task; the schema cascades the delete to its subtree.
pub fn delete_task(conn: &Connection, id: &TaskId) -> Result<()> {
    conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::core::producer::TaskProducer;
    use crate::db::schema;
    use crate::types::NewTask;
    use chrono::{Duration, TimeZone};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    /// Saves a chain of `len` tasks and returns their ids root-first.
    fn saved_chain(conn: &Connection, len: usize) -> Vec<TaskId> {
        let clock = FixedClock::new(now());
        let producer = TaskProducer::new(&clock);
        let mut graph = TaskGraph::new();
        let mut parent = None;
        let mut nodes = Vec::new();
        for i in 0..len {
            let node = producer
                .create_task(
                    &mut graph,
                    NewTask {
                        title: format!("Level {}", i + 1),
                        description: String::new(),
                        deadline: (now() + Duration::days(30 - i as i64)).fixed_offset(),
                        user_id: UserId::new(1),
                    },
                    parent,
                )
                .unwrap();
            nodes.push(node);
            parent = Some(node);
        }
        save(conn, &mut graph).unwrap();
        nodes
            .into_iter()
            .map(|n| graph.task(n).id().cloned().unwrap())
            .collect()
    }

    #[test]
    fn save_assigns_ids_and_links_parents() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 3);

        let child = get_task(&conn, &ids[1]).unwrap().unwrap();
        assert_eq!(child.parent_id(), Some(&ids[0]));
        assert_eq!(child.deadline(), now() + Duration::days(29));
        assert_eq!(child.created_at(), now());
        assert!(child.completed_at().is_none());
    }

    #[test]
    fn ancestors_are_loaded_up_to_root() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 4);

        let (graph, node) = get_with_ancestors(&conn, &ids[3]).unwrap().unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.depth(node).unwrap(), 4);
        assert!(graph.children(node).is_empty());
    }

    #[test]
    fn descendants_are_loaded_without_ancestors() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 4);

        let (graph, node) = get_with_descendants(&conn, &ids[1]).unwrap().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.collect_descendant_ids(node).len(), 2);
        assert!(graph.depth(node).is_err());
    }

    #[test]
    fn lineage_loads_both_directions() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 5);

        let (graph, node) = get_with_lineage(&conn, &ids[2]).unwrap().unwrap();
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.depth(node).unwrap(), 3);
        assert_eq!(graph.descendants(node).len(), 2);
    }

    #[test]
    fn completion_round_trips() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 2);

        let (mut graph, node) = get_with_descendants(&conn, &ids[0]).unwrap().unwrap();
        graph.force_complete(node, now() + Duration::hours(1));
        save(&conn, &mut graph).unwrap();

        for id in &ids {
            let task = get_task(&conn, id).unwrap().unwrap();
            assert_eq!(task.completed_at(), Some(now() + Duration::hours(1)));
        }
        assert_eq!(list_roots(&conn, UserId::new(1), Some(true)).unwrap().len(), 1);
        assert!(list_roots(&conn, UserId::new(1), Some(false)).unwrap().is_empty());
    }

    #[test]
    fn delete_cascades_to_subtree() {
        let conn = setup_db();
        let ids = saved_chain(&conn, 3);

        delete_task(&conn, &ids[0]).unwrap();
        for id in &ids {
            assert!(get_task(&conn, id).unwrap().is_none());
        }
    }

    #[test]
    fn missing_task_loads_as_none() {
        let conn = setup_db();
        let id = TaskId::new();
        assert!(get_task(&conn, &id).unwrap().is_none());
        assert!(get_with_ancestors(&conn, &id).unwrap().is_none());
        assert!(get_with_descendants(&conn, &id).unwrap().is_none());
    }
}
