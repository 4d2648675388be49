//! Object and field level access control.
//!
//! The validator asks an [`AccessController`] about every object and field a
//! query touches, including those reached through lookups and subqueries.
//! A denial is an [`AccessError`]; the validator adds the source position.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::context::QueryContext;
use crate::error::AccessError;

/// Decides which objects and fields a request may read.
pub trait AccessController: Send + Sync {
    fn can_access_object(&self, ctx: &QueryContext, object: &str) -> Result<(), AccessError>;

    fn can_access_field(
        &self,
        ctx: &QueryContext,
        object: &str,
        field: &str,
    ) -> Result<(), AccessError>;

    /// Cache partition for `ctx`.
    ///
    /// Two contexts with the same key must get the same decision for every
    /// object and field, since a cached compilation is reused between them.
    /// `None` disables caching for the request. The default suits
    /// controllers that ignore the context.
    fn cache_key(&self, _ctx: &QueryContext) -> Option<String> {
        Some(String::new())
    }
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn can_access_object(&self, _ctx: &QueryContext, _object: &str) -> Result<(), AccessError> {
        Ok(())
    }

    fn can_access_field(
        &self,
        _ctx: &QueryContext,
        _object: &str,
        _field: &str,
    ) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AccessController for DenyAll {
    fn can_access_object(&self, _ctx: &QueryContext, object: &str) -> Result<(), AccessError> {
        Err(AccessError::object(object))
    }

    fn can_access_field(
        &self,
        _ctx: &QueryContext,
        object: &str,
        field: &str,
    ) -> Result<(), AccessError> {
        Err(AccessError::field(object, field))
    }
}

/// Grants listed objects and all of their fields.
#[derive(Debug, Clone, Default)]
pub struct ObjectAllowList {
    objects: HashSet<String>,
}

impl ObjectAllowList {
    pub fn new<I, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: objects.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessController for ObjectAllowList {
    fn can_access_object(&self, _ctx: &QueryContext, object: &str) -> Result<(), AccessError> {
        if self.objects.contains(object) {
            Ok(())
        } else {
            Err(AccessError::object(object))
        }
    }

    fn can_access_field(
        &self,
        ctx: &QueryContext,
        object: &str,
        field: &str,
    ) -> Result<(), AccessError> {
        self.can_access_object(ctx, object)
            .map_err(|_| AccessError::field(object, field))
    }
}

/// Grants listed objects, optionally narrowed to a set of fields.
///
/// An object with no field set, or an empty one, exposes all of its fields.
#[derive(Debug, Clone, Default)]
pub struct FieldAllowList {
    objects: HashMap<String, HashSet<String>>,
}

impl FieldAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `object` with every field.
    pub fn allow_object(mut self, object: impl Into<String>) -> Self {
        self.objects.entry(object.into()).or_default();
        self
    }

    /// Allow `object`, restricted to `fields`. Repeated calls widen the set.
    pub fn allow<I, S>(mut self, object: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.objects
            .entry(object.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }
}

impl AccessController for FieldAllowList {
    fn can_access_object(&self, _ctx: &QueryContext, object: &str) -> Result<(), AccessError> {
        if self.objects.contains_key(object) {
            Ok(())
        } else {
            Err(AccessError::object(object))
        }
    }

    fn can_access_field(
        &self,
        _ctx: &QueryContext,
        object: &str,
        field: &str,
    ) -> Result<(), AccessError> {
        match self.objects.get(object) {
            Some(fields) if fields.is_empty() || fields.contains(field) => Ok(()),
            _ => Err(AccessError::field(object, field)),
        }
    }
}

type ObjectCallback = dyn Fn(&QueryContext, &str) -> Result<(), AccessError> + Send + Sync;
type FieldCallback = dyn Fn(&QueryContext, &str, &str) -> Result<(), AccessError> + Send + Sync;
type KeyCallback = dyn Fn(&QueryContext) -> String + Send + Sync;

/// Delegates decisions to closures, e.g. a permission-set lookup.
///
/// Closures may look at the context, so compiled queries are not cached
/// unless [`CallbackAccess::with_cache_key`] says how to partition them.
pub struct CallbackAccess {
    object: Box<ObjectCallback>,
    field: Box<FieldCallback>,
    key: Option<Box<KeyCallback>>,
}

impl CallbackAccess {
    pub fn new<O, F>(object: O, field: F) -> Self
    where
        O: Fn(&QueryContext, &str) -> Result<(), AccessError> + Send + Sync + 'static,
        F: Fn(&QueryContext, &str, &str) -> Result<(), AccessError> + Send + Sync + 'static,
    {
        Self {
            object: Box::new(object),
            field: Box::new(field),
            key: None,
        }
    }

    /// Map a context to the cache partition its decisions belong to,
    /// e.g. the role or permission set the closures read.
    pub fn with_cache_key<K>(mut self, key: K) -> Self
    where
        K: Fn(&QueryContext) -> String + Send + Sync + 'static,
    {
        self.key = Some(Box::new(key));
        self
    }
}

impl fmt::Debug for CallbackAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAccess")
            .field("cache_key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

impl AccessController for CallbackAccess {
    fn can_access_object(&self, ctx: &QueryContext, object: &str) -> Result<(), AccessError> {
        (self.object)(ctx, object)
    }

    fn can_access_field(
        &self,
        ctx: &QueryContext,
        object: &str,
        field: &str,
    ) -> Result<(), AccessError> {
        (self.field)(ctx, object, field)
    }

    fn cache_key(&self, ctx: &QueryContext) -> Option<String> {
        self.key.as_ref().map(|key| key(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_allow_list() {
        let ctx = QueryContext::new();
        let access = ObjectAllowList::new(["Account", "User"]);
        assert!(access.can_access_object(&ctx, "Account").is_ok());
        assert!(access.can_access_field(&ctx, "User", "Email").is_ok());
        assert_eq!(
            access.can_access_object(&ctx, "Contact"),
            Err(AccessError::object("Contact"))
        );
        assert_eq!(
            access.can_access_field(&ctx, "Contact", "LastName"),
            Err(AccessError::field("Contact", "LastName"))
        );
    }

    #[test]
    fn test_field_allow_list_restricts_fields() {
        let ctx = QueryContext::new();
        let access = FieldAllowList::new().allow("Account", ["Id", "Name"]);
        assert!(access.can_access_object(&ctx, "Account").is_ok());
        assert!(access.can_access_field(&ctx, "Account", "Name").is_ok());
        assert!(access.can_access_field(&ctx, "Account", "AnnualRevenue").is_err());
        assert!(access.can_access_object(&ctx, "User").is_err());
        assert!(access.can_access_field(&ctx, "User", "Name").is_err());
    }

    #[test]
    fn test_field_allow_list_unrestricted_object() {
        let ctx = QueryContext::new();
        let access = FieldAllowList::new()
            .allow_object("User")
            .allow("Contact", Vec::<String>::new());
        assert!(access.can_access_object(&ctx, "User").is_ok());
        assert!(access.can_access_field(&ctx, "User", "Email").is_ok());
        assert!(access.can_access_field(&ctx, "Contact", "LastName").is_ok());
        assert!(access.can_access_field(&ctx, "Account", "Name").is_err());
    }

    #[test]
    fn test_callback_uses_context() {
        let access = CallbackAccess::new(
            |ctx, object| match ctx.user_id.as_deref() {
                Some("admin") => Ok(()),
                _ => Err(AccessError::object(object).with_reason("admins only")),
            },
            |_ctx, object, field| {
                if field == "Salary" {
                    Err(AccessError::field(object, field))
                } else {
                    Ok(())
                }
            },
        );
        assert!(access
            .can_access_object(&QueryContext::for_user("admin"), "Account")
            .is_ok());
        let err = access
            .can_access_object(&QueryContext::for_user("guest"), "Account")
            .unwrap_err();
        assert_eq!(err.reason.as_deref(), Some("admins only"));
        assert!(access
            .can_access_field(&QueryContext::new(), "Employee", "Salary")
            .is_err());
    }

    #[test]
    fn test_cache_keys() {
        let ctx = QueryContext::for_user("admin");
        assert_eq!(AllowAll.cache_key(&ctx), Some(String::new()));
        assert_eq!(FieldAllowList::new().cache_key(&ctx), Some(String::new()));

        let access = CallbackAccess::new(|_ctx, _object| Ok(()), |_ctx, _object, _field| Ok(()));
        assert_eq!(access.cache_key(&ctx), None);

        let access = access.with_cache_key(|ctx| ctx.user_id.clone().unwrap_or_default());
        assert_eq!(access.cache_key(&ctx).as_deref(), Some("admin"));
    }

    #[test]
    fn test_deny_all() {
        let ctx = QueryContext::new();
        assert_eq!(
            DenyAll.can_access_object(&ctx, "Account"),
            Err(AccessError::object("Account"))
        );
        assert!(AllowAll.can_access_field(&ctx, "Account", "Name").is_ok());
    }
}
