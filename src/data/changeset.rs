use std::fmt;

use super::osm::Element;

/// One `<create>`, `<modify>` or `<delete>` block of an osmChange document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Modified,
    Deleted,
    Edited,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Modified => "modified",
            Action::Deleted => "deleted",
            Action::Edited => "edited",
        }
    }
}

impl From<ChangeKind> for Action {
    fn from(value: ChangeKind) -> Self {
        match value {
            ChangeKind::Create => Action::Created,
            ChangeKind::Modify => Action::Modified,
            ChangeKind::Delete => Action::Deleted,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes of a `<changeset>` element we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesetHeader {
    pub id: i64,
    pub user: Option<String>,
    pub uid: Option<i64>,
}

impl ChangesetHeader {
    pub fn display_user(&self) -> String {
        match (&self.user, self.uid) {
            (Some(user), _) => user.clone(),
            (None, Some(uid)) => format!("User {}", uid),
            (None, None) => "An anonymous user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetView {
    pub user: String,
    pub action: Action,
    pub elements: Vec<Element>,
}

impl ChangesetView {
    /// A changeset touching elements in only one way is described with that
    /// verb; anything mixed is "edited". Elements keep document order.
    pub fn from_blocks(header: &ChangesetHeader, blocks: Vec<(ChangeKind, Vec<Element>)>) -> Self {
        let action = match blocks.first() {
            Some((first, _)) if blocks.iter().all(|(kind, _)| kind == first) => (*first).into(),
            _ => Action::Edited,
        };
        let elements = blocks.into_iter().flat_map(|(_, elements)| elements).collect();

        ChangesetView {
            user: header.display_user(),
            action,
            elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::osm::Tags;

    fn header(user: Option<&str>, uid: Option<i64>) -> ChangesetHeader {
        ChangesetHeader {
            id: 1,
            user: user.map(str::to_string),
            uid,
        }
    }

    #[test]
    fn user_falls_back_to_uid() {
        assert_eq!(header(Some("alice"), Some(3)).display_user(), "alice");
        assert_eq!(header(None, Some(3)).display_user(), "User 3");
    }

    #[test]
    fn single_kind_of_block_names_the_action() {
        let blocks = vec![
            (ChangeKind::Create, vec![Element::node(1, 1, Tags::new())]),
            (ChangeKind::Create, vec![Element::node(2, 1, Tags::new())]),
        ];
        let view = ChangesetView::from_blocks(&header(Some("bob"), None), blocks);
        assert_eq!(view.action, Action::Created);
        assert_eq!(view.elements.len(), 2);
    }

    #[test]
    fn mixed_blocks_are_edited_in_document_order() {
        let blocks = vec![
            (ChangeKind::Modify, vec![Element::node(9, 2, Tags::new())]),
            (ChangeKind::Delete, vec![Element::node(4, 3, Tags::new())]),
        ];
        let view = ChangesetView::from_blocks(&header(Some("bob"), None), blocks);
        assert_eq!(view.action, Action::Edited);
        let ids: Vec<_> = view.elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![9, 4]);
    }
}
