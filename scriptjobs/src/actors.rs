pub(crate) mod broadcaster;
pub(crate) mod registry;
pub(crate) mod worker;
