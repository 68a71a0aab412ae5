use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identity of a capability: its `TypeId`, with the type name kept for diagnostics.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

/// Private alias under which a decorated capability's original binding lives.
/// Never instantiated; only its `TypeId` is used.
pub(crate) struct Undecorated<C: ?Sized>(PhantomData<C>);

impl ServiceKey {
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Key of the original binding once `C` has been decorated.
    pub(crate) fn undecorated<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<Undecorated<C>>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker: Send + Sync {}

    #[test]
    fn keys_compare_by_type() {
        assert_eq!(ServiceKey::of::<dyn Marker>(), ServiceKey::of::<dyn Marker>());
        assert_ne!(ServiceKey::of::<dyn Marker>(), ServiceKey::of::<String>());
    }

    #[test]
    fn undecorated_alias_is_distinct_but_keeps_name() {
        let public = ServiceKey::of::<dyn Marker>();
        let alias = ServiceKey::undecorated::<dyn Marker>();
        assert_ne!(public, alias);
        assert_eq!(public.name(), alias.name());
    }
}
