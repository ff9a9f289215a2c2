use crate::model::{Controller, SelectorBinding};

/// Pairs controllers with selectors by list position.
///
/// The selector list comes from a separate resolution step and carries no
/// controller identity, so index `i` is assumed to belong to controller `i`.
/// When the two orderings diverge the binding is wrong; swapping this for an
/// id-keyed match only needs to change this function.
pub fn bind_selectors_by_position(
    controllers: &[Controller],
    selectors: Option<&[String]>,
) -> Vec<SelectorBinding> {
    controllers
        .iter()
        .enumerate()
        .map(|(index, _)| SelectorBinding {
            controller_index: index,
            selector: selectors
                .and_then(|list| list.get(index))
                .map(|selector| selector.trim())
                .filter(|selector| !selector.is_empty())
                .map(str::to_string),
        })
        .collect()
}
