use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::{HubResult, SmartHubError};

/// Chart a flag was placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    Displacement,
    Heading,
    Velocity,
    Trajectory,
    Unknown,
}

impl GraphKind {
    pub fn from_id(graph_id: u8) -> Self {
        match graph_id {
            1 => GraphKind::Displacement,
            2 => GraphKind::Heading,
            3 => GraphKind::Velocity,
            4 => GraphKind::Trajectory,
            _ => GraphKind::Unknown,
        }
    }
}

impl Display for GraphKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let label = match self {
            GraphKind::Displacement => "displacement",
            GraphKind::Heading => "heading",
            GraphKind::Velocity => "velocity",
            GraphKind::Trajectory => "trajectory",
            GraphKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Flag as submitted by the user, before it is stamped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlag {
    pub id: String,
    pub graph_id: u8,
    pub comment: String,
}

impl NewFlag {
    pub fn new(id: impl Into<String>, graph_id: u8, comment: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph_id,
            comment: comment.into(),
        }
    }
}

/// User annotation tied to the elapsed recording clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub id: String,
    pub graph_id: u8,
    pub comment: String,
    /// `None` when the flag was placed outside a session
    pub time_stamp_ms: Option<i64>,
}

impl Flag {
    pub fn graph(&self) -> GraphKind {
        GraphKind::from_id(self.graph_id)
    }
}

/// Insertion-ordered flags with unique ids
#[derive(Debug, Clone, Default)]
pub struct AnnotationLog {
    flags: Vec<Flag>,
}

impl AnnotationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flag(&mut self, flag: NewFlag, time_stamp_ms: Option<i64>) -> HubResult<&Flag> {
        if self.flags.iter().any(|f| f.id == flag.id) {
            log::warn!("[flags] ignoring duplicate flag id {}", flag.id);
            return Err(SmartHubError::DuplicateFlag(flag.id));
        }

        let graph = GraphKind::from_id(flag.graph_id);
        log::info!(
            "[flags] {} flag on {} at {:?} ms",
            flag.id,
            graph,
            time_stamp_ms
        );
        self.flags.push(Flag {
            id: flag.id,
            graph_id: flag.graph_id,
            comment: flag.comment,
            time_stamp_ms,
        });

        let last = self.flags.len() - 1;
        Ok(&self.flags[last])
    }

    /// Flags for one graph, or every flag when `graph_id` is `None`
    pub fn query(&self, graph_id: Option<u8>) -> Vec<Flag> {
        self.flags
            .iter()
            .filter(|f| graph_id.map_or(true, |id| f.graph_id == id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clear(&mut self) {
        self.flags.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_query_in_order() {
        let mut log = AnnotationLog::new();
        log.add_flag(NewFlag::new("a", 1, "push off"), Some(100)).unwrap();
        log.add_flag(NewFlag::new("b", 3, "coast"), Some(200)).unwrap();
        log.add_flag(NewFlag::new("c", 1, "brake"), Some(300)).unwrap();

        let all: Vec<String> = log.query(None).into_iter().map(|f| f.id).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let displacement = log.query(Some(1));
        assert_eq!(displacement.len(), 2);
        assert_eq!(displacement[1].time_stamp_ms, Some(300));
        assert_eq!(displacement[1].graph(), GraphKind::Displacement);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut log = AnnotationLog::new();
        log.add_flag(NewFlag::new("a", 1, "first"), Some(10)).unwrap();

        let result = log.add_flag(NewFlag::new("a", 2, "second"), Some(20));
        assert_eq!(result, Err(SmartHubError::DuplicateFlag("a".to_string())));
        assert_eq!(log.len(), 1);
        assert_eq!(log.query(None)[0].comment, "first");
    }

    #[test]
    fn test_flag_outside_session_has_no_timestamp() {
        let mut log = AnnotationLog::new();
        let flag = log.add_flag(NewFlag::new("idle", 2, ""), None).unwrap();
        assert_eq!(flag.time_stamp_ms, None);
    }

    #[test]
    fn test_unknown_graph_accepted() {
        let mut log = AnnotationLog::new();
        let flag = log.add_flag(NewFlag::new("x", 9, "odd"), Some(0)).unwrap();
        assert_eq!(flag.graph(), GraphKind::Unknown);
        assert_eq!(flag.graph().to_string(), "unknown");
    }

    #[test]
    fn test_clear() {
        let mut log = AnnotationLog::new();
        log.add_flag(NewFlag::new("a", 1, ""), Some(1)).unwrap();
        log.clear();
        assert!(log.is_empty());

        // Ids are reusable after a clear
        assert!(log.add_flag(NewFlag::new("a", 1, ""), Some(2)).is_ok());
    }
}
