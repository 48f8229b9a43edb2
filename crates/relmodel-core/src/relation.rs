//! Relation metadata.
//!
//! A [`RelationDescriptor`] is declared once per relation (usually when a
//! [`ModelSchema`](crate::ModelSchema) is built) and read by the loader for
//! every resolution. Descriptors are plain values: the loader never mutates
//! them, so one descriptor can serve any number of resolutions.

use crate::error::{Error, Result};
use crate::query::{Condition, OrderBy, Query};
use crate::record::RecordView;
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

const ATTRIBUTE_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static ATTRIBUTE_NAME: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn is_attribute_name(name: &str) -> Result<bool> {
    match ATTRIBUTE_NAME.get_or_init(|| Regex::new(ATTRIBUTE_PATTERN)) {
        Ok(re) => Ok(re.is_match(name)),
        Err(e) => Err(Error::Custom(format!("invalid attribute pattern: {e}"))),
    }
}

/// One column correspondence of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    /// Attribute on the record declaring the relation (primary side).
    pub local: String,
    /// Attribute on the related record (dependent side).
    pub foreign: String,
}

/// Ordered mapping from local attributes to foreign attributes.
///
/// Order is significant: composite keys are compared position by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSpec {
    pairs: Vec<LinkPair>,
}

impl LinkSpec {
    /// Build a link from `(local, foreign)` pairs.
    ///
    /// No validation happens here; the loader validates links before use.
    /// Use [`LinkSpec::try_new`] to validate eagerly.
    pub fn new<L, F, I>(pairs: I) -> Self
    where
        L: Into<String>,
        F: Into<String>,
        I: IntoIterator<Item = (L, F)>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(local, foreign)| LinkPair {
                    local: local.into(),
                    foreign: foreign.into(),
                })
                .collect(),
        }
    }

    /// Build and validate a link.
    pub fn try_new<L, F, I>(pairs: I) -> Result<Self>
    where
        L: Into<String>,
        F: Into<String>,
        I: IntoIterator<Item = (L, F)>,
    {
        let link = Self::new(pairs);
        link.validate()?;
        Ok(link)
    }

    /// A single-column link.
    pub fn single(local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self::new([(local.into(), foreign.into())])
    }

    /// Check the link is usable: non-empty, well-formed names, no repeats.
    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(Error::invalid_link(
                "Invalid link: it must contain at least one attribute pair",
            ));
        }
        for (i, pair) in self.pairs.iter().enumerate() {
            for name in [&pair.local, &pair.foreign] {
                if !is_attribute_name(name)? {
                    return Err(Error::invalid_link(format!(
                        "Invalid link: \"{}\" is not a valid attribute name",
                        name
                    )));
                }
            }
            let earlier = &self.pairs[..i];
            if earlier.iter().any(|p| p.local == pair.local) {
                return Err(Error::invalid_link(format!(
                    "Invalid link: local attribute \"{}\" appears twice",
                    pair.local
                )));
            }
            if earlier.iter().any(|p| p.foreign == pair.foreign) {
                return Err(Error::invalid_link(format!(
                    "Invalid link: foreign attribute \"{}\" appears twice",
                    pair.foreign
                )));
            }
        }
        Ok(())
    }

    pub fn pairs(&self) -> &[LinkPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Local (primary side) attribute names, in link order.
    pub fn local_attributes(&self) -> Vec<&str> {
        self.pairs.iter().map(|p| p.local.as_str()).collect()
    }

    /// Foreign (dependent side) attribute names, in link order.
    pub fn foreign_attributes(&self) -> Vec<&str> {
        self.pairs.iter().map(|p| p.foreign.as_str()).collect()
    }
}

/// How members of a to-many relation are keyed.
#[derive(Clone)]
pub enum IndexBy {
    /// Key each member by the value of one of its attributes.
    Attribute(String),
    /// Key each member by a computed value.
    Callback(Arc<dyn Fn(&dyn RecordView) -> Value + Send + Sync>),
}

impl IndexBy {
    /// Compute the index of one related record.
    pub fn index_of(&self, record: &dyn RecordView) -> Value {
        match self {
            IndexBy::Attribute(name) => record.attribute(name).cloned().unwrap_or(Value::Null),
            IndexBy::Callback(f) => f(record),
        }
    }
}

impl fmt::Debug for IndexBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBy::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            IndexBy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// The intermediate step of an indirect relation.
#[derive(Debug, Clone)]
pub enum Via {
    /// A junction table read as raw rows.
    Table(Box<RelationDescriptor>),
    /// Another relation of the same owner, resolved first.
    Relation {
        name: String,
        relation: Box<RelationDescriptor>,
    },
}

impl Via {
    /// The descriptor of the intermediate step.
    pub fn relation(&self) -> &RelationDescriptor {
        match self {
            Via::Table(relation) | Via::Relation { relation, .. } => relation,
        }
    }
}

/// Describes how to resolve one relation.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Model kind declaring the relation (the primary records' kind).
    pub owner: String,
    /// Model kind (or junction table) holding the related records.
    pub target: String,
    /// To-many (`true`) or to-one (`false`).
    pub multiple: bool,
    /// Key correspondence between primary and related records.
    pub link: LinkSpec,
    /// Intermediate step for indirect relations.
    pub via: Option<Via>,
    /// Name of the relation on the target pointing back at the owner.
    pub inverse_of: Option<String>,
    /// Keying of to-many members.
    pub index_by: Option<IndexBy>,
    /// Result mode; `None` inherits from the caller.
    pub as_array: Option<bool>,
    /// Extra conditions applied to the dependent query.
    pub conditions: Vec<Condition>,
    /// Ordering of the dependent query.
    pub order_by: Vec<OrderBy>,
}

impl RelationDescriptor {
    fn new(target: impl Into<String>, link: LinkSpec, multiple: bool) -> Self {
        Self {
            owner: String::new(),
            target: target.into(),
            multiple,
            link,
            via: None,
            inverse_of: None,
            index_by: None,
            as_array: None,
            conditions: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// A to-one relation to `target`.
    pub fn has_one(target: impl Into<String>, link: LinkSpec) -> Self {
        Self::new(target, link, false)
    }

    /// A to-many relation to `target`.
    pub fn has_many(target: impl Into<String>, link: LinkSpec) -> Self {
        Self::new(target, link, true)
    }

    /// Set the owner kind, recursively for the via chain.
    ///
    /// [`ModelSchema::with_relation`](crate::ModelSchema::with_relation)
    /// calls this with the schema's kind.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.set_owner(&owner.into());
        self
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
        match &mut self.via {
            Some(Via::Table(relation) | Via::Relation { relation, .. }) => {
                relation.set_owner(owner);
            }
            None => {}
        }
    }

    /// Resolve through another relation of the owner.
    #[must_use]
    pub fn via_relation(mut self, name: impl Into<String>, relation: RelationDescriptor) -> Self {
        self.via = Some(Via::Relation {
            name: name.into(),
            relation: Box::new(relation),
        });
        self
    }

    /// Resolve through a junction table.
    ///
    /// `link` maps owner attributes to junction-table columns.
    #[must_use]
    pub fn via_table(mut self, table: impl Into<String>, link: LinkSpec) -> Self {
        let mut junction = Self::new(table, link, true);
        junction.as_array = Some(true);
        junction.owner.clone_from(&self.owner);
        self.via = Some(Via::Table(Box::new(junction)));
        self
    }

    /// Declare the inverse relation on the target.
    #[must_use]
    pub fn inverse_of(mut self, name: impl Into<String>) -> Self {
        self.inverse_of = Some(name.into());
        self
    }

    /// Key to-many members by an attribute.
    #[must_use]
    pub fn index_by(mut self, attribute: impl Into<String>) -> Self {
        self.index_by = Some(IndexBy::Attribute(attribute.into()));
        self
    }

    /// Key to-many members by a computed value.
    #[must_use]
    pub fn index_by_callback(
        mut self,
        f: impl Fn(&dyn RecordView) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.index_by = Some(IndexBy::Callback(Arc::new(f)));
        self
    }

    /// Fix the result mode of this relation.
    #[must_use]
    pub fn as_array(mut self, value: bool) -> Self {
        self.as_array = Some(value);
        self
    }

    /// Add a condition to the dependent query.
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add an ordering term to the dependent query.
    #[must_use]
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
        self
    }

    /// Validate this relation's link and every link of its via chain.
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        if let Some(via) = &self.via {
            via.relation().validate()?;
        }
        Ok(())
    }

    /// The link whose local attributes address the primary records.
    ///
    /// For indirect relations this is the link of the innermost via step.
    pub fn acting_link(&self) -> &LinkSpec {
        let mut current = self;
        while let Some(via) = &current.via {
            current = via.relation();
        }
        &current.link
    }

    /// The dependent query before narrowing by primary keys.
    pub fn base_query(&self) -> Query {
        let mut query = Query::new(self.target.clone()).order_by(self.order_by.iter().cloned());
        for condition in &self.conditions {
            query = query.and_where(condition.clone());
        }
        query
    }
}
