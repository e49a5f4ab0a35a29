use crate::data::{Action, Element, Feature};
use crate::english;
use crate::features::Matcher;

/// An element with every feature it matched, in catalog order.
pub type MatchedElement<'e, 'f> = (&'e Element, Vec<&'f Feature>);

/// Elements sharing a feature. `feature` is `None` for the elements that
/// matched nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<'e, 'f> {
    pub feature: Option<&'f Feature>,
    pub elements: Vec<&'e Element>,
}

impl Group<'_, '_> {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_unclassified(&self) -> bool {
        self.feature.is_none()
    }
}

/// Elements matching more features come first; ties keep their order.
pub fn sort_by_feature_count(pairs: &mut [MatchedElement<'_, '_>]) {
    pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
}

/// Greedy grouping: the first remaining element's first feature becomes the
/// next group and claims every remaining element that matched it. Elements
/// without any feature end up in one trailing unclassified group.
pub fn group_by_feature<'e, 'f>(pairs: Vec<MatchedElement<'e, 'f>>) -> Vec<Group<'e, 'f>> {
    let (mut remaining, unmatched): (Vec<_>, Vec<_>) =
        pairs.into_iter().partition(|(_, features)| !features.is_empty());

    let mut groups = Vec::new();
    loop {
        let feature = match remaining.first() {
            Some((_, features)) => features[0],
            None => break,
        };
        let (claimed, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|(_, features)| features.iter().any(|f| std::ptr::eq(*f, feature)));
        groups.push(Group {
            feature: Some(feature),
            elements: claimed.into_iter().map(|(element, _)| element).collect(),
        });
        remaining = rest;
    }

    if !unmatched.is_empty() {
        groups.push(Group {
            feature: None,
            elements: unmatched.into_iter().map(|(element, _)| element).collect(),
        });
    }
    groups
}

/// Largest groups first, stable for equal sizes. The unclassified group
/// stays last.
pub fn sort_groups(groups: &mut [Group<'_, '_>]) {
    groups.sort_by(|a, b| {
        a.is_unclassified()
            .cmp(&b.is_unclassified())
            .then_with(|| b.len().cmp(&a.len()))
    });
}

pub fn render_group(group: &Group<'_, '_>) -> String {
    match (group.feature, group.elements.as_slice()) {
        (_, []) => String::new(),
        (Some(feature), [element]) => english::display_name(element, feature),
        (None, [element]) => english::common_name(element),
        (Some(feature), elements) => format!(
            "{} {}",
            english::number_to_words(elements.len() as u64),
            feature.plural
        ),
        (None, elements) => format!(
            "{} unclassified elements",
            english::number_to_words(elements.len() as u64)
        ),
    }
}

pub fn render_groups(groups: &[Group<'_, '_>]) -> String {
    let parts: Vec<String> = groups
        .iter()
        .filter(|group| !group.is_empty())
        .map(render_group)
        .collect();
    if parts.is_empty() {
        "nothing".to_string()
    } else {
        english::join_list(&parts)
    }
}

/// Matches, groups and renders already augmented elements.
pub fn group_elements<'e, 'f>(
    matcher: &Matcher<'f>,
    elements: &'e [Element],
) -> Vec<Group<'e, 'f>> {
    let matches = matcher.match_each(elements);
    let mut pairs: Vec<MatchedElement<'e, 'f>> = elements.iter().zip(matches).collect();
    sort_by_feature_count(&mut pairs);
    let mut groups = group_by_feature(pairs);
    sort_groups(&mut groups);
    groups
}

/// `"alice created three benches and a park"`.
pub fn describe(matcher: &Matcher<'_>, user: &str, action: Action, elements: &[Element]) -> String {
    let groups = group_elements(matcher, elements);
    format!("{} {} {}", user, action, render_groups(&groups))
}
