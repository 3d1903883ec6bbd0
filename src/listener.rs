use std::{fmt, sync::Arc};

type Callback<C> = dyn Fn(&C, &str) + Send + Sync + 'static;

/// A callback registered against an event.
///
/// It is invoked with the attached context as receiver and the event name as
/// its only argument; signals carry no payload, so the listener is expected
/// to re-fetch whatever state it cares about.
///
/// Listeners compare by identity: clones of one listener are equal, two
/// listeners built from identical closures are not. Keep a clone around to
/// [`unsubscribe`](crate::ContextHandle::unsubscribe) later.
///
/// # Example
///
/// ```rust
/// use nudge::Listener;
///
/// struct Restaurant;
///
/// let on_change = Listener::new(|_: &Restaurant, event: &str| {
///     println!("{event} happened, reloading");
/// });
/// assert_eq!(on_change, on_change.clone());
/// ```
pub struct Listener<C> {
    callback: Arc<Callback<C>>,
}

impl<C> Listener<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(f),
        }
    }

    #[inline]
    pub(crate) fn call(&self, context: &C, event: &str) {
        (self.callback)(context, event)
    }
}

impl<C> Clone for Listener<C> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
        }
    }
}

impl<C> PartialEq for Listener<C> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl<C> Eq for Listener<C> {}

impl<C> fmt::Debug for Listener<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.callback).cast::<()>())
    }
}
