// ── Transparent call proxy ────────────────────────────────────────────────────
//
// Binds a delegate object to a loop thread.  Every call made through the proxy
// executes on that thread with the delegate as receiver; calls made on the
// loop thread itself run in place.
//
//   • `Err` values returned by the delegate come back as `PumpError::Task`,
//     carrying the original error and both threads' stacks.
//   • A panic in the delegate is re-raised on the calling thread, as if the
//     method had been called directly.

use std::convert::Infallible;
use std::fmt;
use std::panic;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BoxError, PumpError, Result};
use crate::message_loop::MessageLoop;
use crate::platform::{DefaultPump, Pump};

/// A delegate whose every call is marshalled onto its owning loop thread.
///
/// Calls made on the loop thread run in place, with one exception: a call
/// issued while the same delegate is already borrowed by an outer call on
/// that thread (for example from inside a closure passed to [`call`]) fails
/// with [`PumpError::ReentrantCall`] instead of running.  The delegate is
/// handed out as `&mut T`, so two live borrows of it cannot coexist.
/// Nested calls on a *different* proxy are unaffected.
///
/// A panic inside the delegate is re-raised on the caller with its original
/// payload, just as if the method had been called directly.
///
/// [`call`]: Proxy::call
pub struct Proxy<T, P: Pump = DefaultPump> {
    delegate: Arc<Mutex<T>>,
    owner: MessageLoop<P>,
}

impl<T, P: Pump> Clone for Proxy<T, P> {
    fn clone(&self) -> Self {
        Self {
            delegate: self.delegate.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<T: Send + 'static, P: Pump> Proxy<T, P> {
    pub fn new(owner: &MessageLoop<P>, delegate: T) -> Self {
        Self {
            delegate: Arc::new(Mutex::new(delegate)),
            owner: owner.clone(),
        }
    }

    /// The loop thread this proxy marshals onto.
    pub fn owner(&self) -> &MessageLoop<P> {
        &self.owner
    }

    /// Run `f` against the delegate on the loop thread and wait for it.
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.try_call(move |delegate| Ok::<R, Infallible>(f(delegate)))
    }

    /// As [`call`](Self::call), for delegate methods that return `Result`.
    pub fn try_call<R, E, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<BoxError>,
    {
        // Only the loop thread ever locks the delegate, so a held lock seen
        // from the loop thread means an outer call on this stack owns it.
        if self.owner.is_loop_thread() && self.delegate.is_locked() {
            return Err(PumpError::ReentrantCall);
        }

        let delegate = self.delegate.clone();
        let outcome = self.owner.try_run_on_thread(move || {
            let mut guard = delegate.lock();
            f(&mut *guard)
        });

        match outcome {
            Err(PumpError::Task(failure)) if failure.is_panic() => {
                tracing::debug!(trace = %failure.trace(), "re-raising delegate panic on caller");
                match (*failure).into_panic() {
                    Ok(payload) => panic::resume_unwind(payload),
                    Err(failure) => Err(PumpError::from(failure)),
                }
            }
            other => other,
        }
    }
}

impl<T, P: Pump> fmt::Debug for Proxy<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("delegate", &std::any::type_name::<T>())
            .field("owner", &self.owner)
            .finish()
    }
}

// ── Facade generation ─────────────────────────────────────────────────────────

/// Generate a named facade over a [`Proxy`] for a fixed set of delegate
/// methods.
///
/// Each listed method becomes a method on the facade with the same arguments,
/// returning `msgpump::Result<Ret>`.  Arguments must be `Send + 'static`.
///
/// ```ignore
/// msgpump::facade! {
///     pub struct RemoteConversation(Conversation);
///     fn request(&self, topic: String) -> Vec<u8>;
///     fn disconnect(&self) -> ();
/// }
///
/// let conv = RemoteConversation::new(&message_loop, Conversation::default());
/// let data = conv.request("status".into())?;
/// ```
#[macro_export]
macro_rules! facade {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($target:ty);
        $(
            $(#[$fn_meta:meta])*
            fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
        )*
    ) => {
        $(#[$meta])*
        $vis struct $name<P: $crate::Pump = $crate::DefaultPump>($crate::Proxy<$target, P>);

        impl<P: $crate::Pump> $name<P> {
            /// Bind `delegate` to `owner`'s loop thread.
            $vis fn new(owner: &$crate::MessageLoop<P>, delegate: $target) -> Self {
                Self($crate::Proxy::new(owner, delegate))
            }

            /// The proxy every facade method goes through.
            #[allow(dead_code)]
            $vis fn proxy(&self) -> &$crate::Proxy<$target, P> {
                &self.0
            }

            $(
                $(#[$fn_meta])*
                $vis fn $method(&self $(, $arg: $arg_ty)*) -> $crate::Result<$ret> {
                    self.0.call(move |delegate| delegate.$method($($arg),*))
                }
            )*
        }

        impl<P: $crate::Pump> ::std::clone::Clone for $name<P> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }
    };
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::portable::ChannelPump;
    use std::panic::AssertUnwindSafe;
    use std::thread::{self, ThreadId};

    #[derive(Default)]
    struct Tally {
        total: u64,
        callers: Vec<ThreadId>,
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("overflow adding {0}")]
    struct Overflow(u64);

    #[derive(Debug, PartialEq)]
    struct Jammed(u32);

    impl Tally {
        fn add(&mut self, n: u64) -> u64 {
            self.callers.push(thread::current().id());
            self.total += n;
            self.total
        }

        fn total(&self) -> u64 {
            self.total
        }

        fn checked_add(&mut self, n: u64) -> std::result::Result<u64, Overflow> {
            self.total = self.total.checked_add(n).ok_or(Overflow(n))?;
            Ok(self.total)
        }

        fn explode(&self) -> u64 {
            panic!("delegate exploded")
        }
    }

    crate::facade! {
        struct RemoteTally(Tally);
        fn add(&self, n: u64) -> u64;
        fn total(&self) -> u64;
        fn checked_add(&self, n: u64) -> std::result::Result<u64, Overflow>;
    }

    fn spawn_loop() -> MessageLoop<ChannelPump> {
        let ml = MessageLoop::with_pump(ChannelPump::new());
        ml.start().expect("start");
        ml
    }

    #[test]
    fn calls_execute_on_loop_thread() {
        let ml = spawn_loop();
        let proxy = Proxy::new(&ml, Tally::default());
        assert_eq!(proxy.call(|t| t.add(2)).expect("call"), 2);
        assert_eq!(proxy.call(|t| t.add(3)).expect("call"), 5);

        let loop_id = ml.wait_ready().expect("ready").logical;
        let callers = proxy.call(|t| t.callers.clone()).expect("call");
        assert_eq!(callers, vec![loop_id, loop_id]);
        ml.shutdown().expect("shutdown");
    }

    #[test]
    fn delegate_error_reaches_caller_unchanged() {
        let ml = spawn_loop();
        let proxy = Proxy::new(
            &ml,
            Tally {
                total: u64::MAX,
                ..Tally::default()
            },
        );
        match proxy.try_call(|t| t.checked_add(1)) {
            Err(PumpError::Task(f)) => {
                assert_eq!(f.downcast_ref::<Overflow>(), Some(&Overflow(1)));
                assert!(f.submitted_at().is_some());
                assert!(f.trace().contains("marshalled from:"));
            }
            other => panic!("unexpected {other:?}"),
        }
        ml.shutdown().expect("shutdown");
    }

    #[test]
    fn delegate_panic_is_reraised_on_caller() {
        let ml = spawn_loop();
        let proxy = Proxy::new(&ml, Tally::default());
        let caught = panic::catch_unwind(AssertUnwindSafe(|| proxy.call(|t| t.explode())))
            .expect_err("panic crosses back");
        assert_eq!(caught.downcast_ref::<&'static str>(), Some(&"delegate exploded"));

        let formatted = panic::catch_unwind(AssertUnwindSafe(|| {
            proxy.call(|t| -> u64 { panic!("tally at {}", t.total) })
        }))
        .expect_err("formatted panic crosses back");
        assert_eq!(
            formatted.downcast_ref::<String>().map(String::as_str),
            Some("tally at 0")
        );

        let custom = panic::catch_unwind(AssertUnwindSafe(|| {
            proxy.call(|_| -> u64 { panic::panic_any(Jammed(7)) })
        }))
        .expect_err("custom payload crosses back");
        assert_eq!(custom.downcast_ref::<Jammed>(), Some(&Jammed(7)));

        // The loop and the delegate survive.
        assert_eq!(proxy.call(|t| t.add(1)).expect("call"), 1);
        ml.shutdown().expect("shutdown");
    }

    #[test]
    fn call_from_loop_thread_runs_in_place() {
        let ml = spawn_loop();
        let proxy = Proxy::new(&ml, Tally::default());
        let inner = proxy.clone();
        let res = ml
            .run_on_thread(move || inner.call(|t| t.add(4)))
            .expect("outer run");
        assert_eq!(res.expect("inner call"), 4);
        ml.shutdown().expect("shutdown");
    }

    #[test]
    fn nested_call_on_same_delegate_is_refused() {
        let ml = spawn_loop();
        let proxy = Proxy::new(&ml, Tally::default());
        let inner = proxy.clone();
        let nested = proxy.call(move |_| inner.call(|t| t.total())).expect("outer call");
        assert!(matches!(nested, Err(PumpError::ReentrantCall)));
        ml.shutdown().expect("shutdown");
    }

    #[test]
    fn calls_after_exit_fail() {
        let ml = spawn_loop();
        let proxy = Proxy::new(&ml, Tally::default());
        ml.shutdown().expect("shutdown");
        assert!(matches!(proxy.call(|t| t.add(1)), Err(PumpError::LoopExited)));
    }

    #[test]
    fn facade_marshals_each_method() {
        let ml = spawn_loop();
        let tally = RemoteTally::new(&ml, Tally::default());
        let other_handle = tally.clone();

        let worker = thread::spawn(move || other_handle.add(10).expect("add"));
        worker.join().expect("worker");
        assert_eq!(tally.add(5).expect("add"), 15);
        assert_eq!(tally.total().expect("total"), 15);
        assert_eq!(
            tally.checked_add(u64::MAX).expect("marshalled"),
            Err(Overflow(u64::MAX))
        );

        let loop_id = ml.wait_ready().expect("ready").logical;
        let callers = tally.proxy().call(|t| t.callers.clone()).expect("call");
        assert!(callers.iter().all(|id| *id == loop_id));
        ml.shutdown().expect("shutdown");
    }
}
