// Relationship declarations - every foreign reference between entities is
// declared once here and the store's delete routine is driven by this table

use crate::models::EntityType;

/// What happens to a referencing row when its target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Referencing rows are deleted along with the target.
    Strong,
    /// The reference column is cleared; the referencing row survives.
    Weak,
}

/// `from.column` points at a row of `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDefinition {
    pub name: &'static str,
    pub from: EntityType,
    pub column: &'static str,
    pub to: EntityType,
    pub kind: ReferenceKind,
}

impl RelationDefinition {
    const fn strong(name: &'static str, from: EntityType, column: &'static str, to: EntityType) -> Self {
        Self { name, from, column, to, kind: ReferenceKind::Strong }
    }

    const fn weak(name: &'static str, from: EntityType, column: &'static str, to: EntityType) -> Self {
        Self { name, from, column, to, kind: ReferenceKind::Weak }
    }
}

pub const RELATIONS: &[RelationDefinition] = &[
    RelationDefinition::strong("post_author", EntityType::Post, "author_id", EntityType::User),
    RelationDefinition::weak("post_group", EntityType::Post, "group_id", EntityType::Group),
    RelationDefinition::weak("comment_post", EntityType::Comment, "post_id", EntityType::Post),
    RelationDefinition::strong("comment_author", EntityType::Comment, "author_id", EntityType::User),
    RelationDefinition::strong("follow_user", EntityType::Follow, "user_id", EntityType::User),
    RelationDefinition::strong("follow_author", EntityType::Follow, "author_id", EntityType::User),
];

/// Columns that are written once at insert time.
const IMMUTABLE_FIELDS: &[(EntityType, &str)] = &[
    (EntityType::Post, "created_at"),
    (EntityType::Comment, "created_at"),
];

pub fn relations_targeting(target: EntityType) -> impl Iterator<Item = &'static RelationDefinition> {
    RELATIONS.iter().filter(move |relation| relation.to == target)
}

pub fn is_immutable(entity: EntityType, field: &str) -> bool {
    IMMUTABLE_FIELDS
        .iter()
        .any(|(owner, name)| *owner == entity && *name == field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deletion_cascades_everywhere() {
        let dependents: Vec<_> = relations_targeting(EntityType::User).collect();
        assert_eq!(dependents.len(), 4);
        assert!(dependents.iter().all(|r| r.kind == ReferenceKind::Strong));
    }

    #[test]
    fn test_group_and_post_references_are_weak() {
        let group: Vec<_> = relations_targeting(EntityType::Group).collect();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].kind, ReferenceKind::Weak);
        assert_eq!(group[0].column, "group_id");

        let post: Vec<_> = relations_targeting(EntityType::Post).collect();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].kind, ReferenceKind::Weak);
        assert_eq!(post[0].from, EntityType::Comment);
    }

    #[test]
    fn test_nothing_references_follows_or_comments() {
        assert_eq!(relations_targeting(EntityType::Follow).count(), 0);
        assert_eq!(relations_targeting(EntityType::Comment).count(), 0);
    }

    #[test]
    fn test_created_at_is_immutable() {
        assert!(is_immutable(EntityType::Post, "created_at"));
        assert!(is_immutable(EntityType::Comment, "created_at"));
        assert!(!is_immutable(EntityType::Post, "text"));
    }
}
