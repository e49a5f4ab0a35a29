use log::info;

use crate::augment::{ElementSource, GraphAugmenter};
use crate::data::{ChangeKind, ChangesetHeader, ChangesetView, Element};
use crate::describe;
use crate::errors::Result;
use crate::features::Matcher;

use super::Etl;

pub const ETL_NAME: &str = "describe_changeset";

/// Where changeset metadata and contents come from.
pub trait ChangesetSource {
    fn changeset(&self, changeset_id: i64) -> Result<ChangesetHeader>;
    fn change(&self, changeset_id: i64) -> Result<Vec<(ChangeKind, Vec<Element>)>>;
}

/// A changeset already read from local files.
#[derive(Debug, Clone)]
pub struct LocalChangeset {
    pub header: ChangesetHeader,
    pub blocks: Vec<(ChangeKind, Vec<Element>)>,
}

impl ChangesetSource for LocalChangeset {
    fn changeset(&self, _changeset_id: i64) -> Result<ChangesetHeader> {
        Ok(self.header.clone())
    }

    fn change(&self, _changeset_id: i64) -> Result<Vec<(ChangeKind, Vec<Element>)>> {
        Ok(self.blocks.clone())
    }
}

/// Fetch, augment, match, group and render one changeset.
pub struct DescribeChangesetEtl<'a> {
    changesets: &'a dyn ChangesetSource,
    lookups: &'a dyn ElementSource,
    matcher: Matcher<'a>,
    changeset_id: i64,
    max_concurrent_lookups: usize,
}

impl<'a> DescribeChangesetEtl<'a> {
    pub fn new(
        changesets: &'a dyn ChangesetSource,
        lookups: &'a dyn ElementSource,
        matcher: Matcher<'a>,
        changeset_id: i64,
        max_concurrent_lookups: usize,
    ) -> Self {
        DescribeChangesetEtl {
            changesets,
            lookups,
            matcher,
            changeset_id,
            max_concurrent_lookups,
        }
    }
}

impl Etl for DescribeChangesetEtl<'_> {
    type Input = ChangesetView;
    type Output = String;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn extract(&mut self) -> Result<Self::Input> {
        let header = self.changesets.changeset(self.changeset_id)?;
        let blocks = self.changesets.change(self.changeset_id)?;
        let view = ChangesetView::from_blocks(&header, blocks);
        info!(
            changeset_id = self.changeset_id,
            action = view.action.as_str(),
            elements = view.elements.len();
            "Read changeset"
        );
        Ok(view)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let augmenter = GraphAugmenter::new(self.lookups, self.max_concurrent_lookups)?;
        let elements = augmenter.augment(input.elements)?;
        Ok(describe::describe(&self.matcher, &input.user, input.action, &elements))
    }
}
