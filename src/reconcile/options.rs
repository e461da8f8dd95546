//! Options accepted by apply

use crate::resource::Resource;

/// Lifecycle directives restricting which changes apply may make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleParam {
    /// Fail instead of creating a resource that does not exist
    BlockCreation,
    /// Fail if the resource already exists
    BlockAcquire,
    /// Fail instead of updating an existing resource in place
    BlockModification,
    /// Fail instead of deleting a resource (including delete-and-recreate)
    BlockDestruction,
}

#[derive(Debug, Clone)]
pub enum ApplyOption {
    /// Fetch the initial state using this resource instead of the desired one
    StateHint(Resource),
    Lifecycle(LifecycleParam),
}

pub fn fetch_state_hint(opts: &[ApplyOption]) -> Option<&Resource> {
    opts.iter().find_map(|o| match o {
        ApplyOption::StateHint(r) => Some(r),
        ApplyOption::Lifecycle(_) => None,
    })
}

pub fn fetch_lifecycle_params(opts: &[ApplyOption]) -> Vec<LifecycleParam> {
    opts.iter()
        .filter_map(|o| match o {
            ApplyOption::Lifecycle(p) => Some(*p),
            ApplyOption::StateHint(_) => None,
        })
        .collect()
}

pub fn has_lifecycle_param(params: &[LifecycleParam], param: LifecycleParam) -> bool {
    params.contains(&param)
}
