//! Session-scoped NPC dialogue state.
//!
//! A dialogue is a pointer into an NPC template's dialogue tree. The
//! handler renders the current node as a prompt plus numbered choices and
//! advances the pointer on `DialogueChoice` commands. Movement, combat, or
//! `look` clears the state.

use std::collections::HashSet;

use crate::types::MobId;
use crate::world::{DialogueChoice, DialogueNode, DialogueTree};

#[derive(Debug, Clone)]
pub struct DialogueState {
    pub npc: MobId,
    pub node: String,
    pub visited: HashSet<String>,
}

impl DialogueState {
    pub fn new(npc: MobId, tree: &DialogueTree) -> Self {
        let mut visited = HashSet::new();
        visited.insert(tree.start.clone());
        Self {
            npc,
            node: tree.start.clone(),
            visited,
        }
    }

    pub fn current<'t>(&self, tree: &'t DialogueTree) -> Option<&'t DialogueNode> {
        tree.nodes.get(&self.node)
    }

    /// The 1-based choice `n` of the current node, if it exists.
    pub fn choice<'t>(&self, tree: &'t DialogueTree, n: u8) -> Option<&'t DialogueChoice> {
        if n == 0 {
            return None;
        }
        let node = self.current(tree)?;
        node.choices.get(n as usize - 1)
    }

    /// Advance to `next`, recording the visit.
    pub fn advance(&mut self, next: &str) {
        self.node = next.to_string();
        self.visited.insert(next.to_string());
    }
}

/// Render a node as the lines the player sees.
pub fn render_node(node: &DialogueNode) -> Vec<String> {
    let mut lines = vec![node.prompt.clone()];
    for (i, choice) in node.choices.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, choice.label));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tree() -> DialogueTree {
        DialogueTree {
            start: "greet".into(),
            nodes: HashMap::from([
                (
                    "greet".into(),
                    DialogueNode {
                        prompt: "Hello, traveller.".into(),
                        choices: vec![
                            DialogueChoice {
                                label: "Tell me more.".into(),
                                actions: vec![],
                                next: Some("more".into()),
                            },
                            DialogueChoice {
                                label: "Goodbye.".into(),
                                actions: vec![],
                                next: None,
                            },
                        ],
                    },
                ),
                (
                    "more".into(),
                    DialogueNode {
                        prompt: "There is little more to tell.".into(),
                        choices: vec![],
                    },
                ),
            ]),
        }
    }

    #[test]
    fn starts_at_the_start_node() {
        let tree = tree();
        let state = DialogueState::new(MobId(1), &tree);
        assert_eq!(state.current(&tree).unwrap().prompt, "Hello, traveller.");
    }

    #[test]
    fn choices_are_one_based() {
        let tree = tree();
        let state = DialogueState::new(MobId(1), &tree);
        assert_eq!(state.choice(&tree, 1).unwrap().label, "Tell me more.");
        assert_eq!(state.choice(&tree, 2).unwrap().label, "Goodbye.");
        assert!(state.choice(&tree, 3).is_none());
        assert!(state.choice(&tree, 0).is_none());
    }

    #[test]
    fn advance_tracks_visits() {
        let tree = tree();
        let mut state = DialogueState::new(MobId(1), &tree);
        state.advance("more");
        assert_eq!(state.current(&tree).unwrap().prompt, "There is little more to tell.");
        assert!(state.visited.contains("greet"));
        assert!(state.visited.contains("more"));
    }

    #[test]
    fn render_numbers_the_choices() {
        let tree = tree();
        let node = tree.nodes.get("greet").unwrap();
        let lines = render_node(node);
        assert_eq!(lines[0], "Hello, traveller.");
        assert_eq!(lines[1], "1. Tell me more.");
        assert_eq!(lines[2], "2. Goodbye.");
    }
}
