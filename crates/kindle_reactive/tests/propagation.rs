//! Propagation guarantees of the reactive graph, exercised through the
//! public API only.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use kindle_reactive::{cleanup, Runtime, Signal};

fn counting_effect<T: Clone + 'static>(
    rt: &Runtime,
    read: impl Fn() -> T + 'static,
) -> (kindle_reactive::Effect, Rc<Cell<u32>>) {
    let runs = Rc::new(Cell::new(0));
    let effect = rt.effect({
        let runs = Rc::clone(&runs);
        move || {
            read();
            runs.set(runs.get() + 1);
        }
    });
    (effect, runs)
}

fn diamond(rt: &Runtime) -> (Signal<i32>, kindle_reactive::Computed<i32>) {
    let s = rt.signal(1);
    let b = rt.computed({
        let s = s.clone();
        move || s.get() * 2
    });
    let c = rt.computed({
        let s = s.clone();
        move || s.get() + 1
    });
    let d = rt.computed(move || b.get() + c.get());
    (s, d)
}

#[test]
fn test_diamond_batch_runs_shared_effect_once() {
    let rt = Runtime::new();
    let (s, d) = diamond(&rt);
    let (_effect, runs) = counting_effect(&rt, {
        let d = d.clone();
        move || d.get()
    });
    assert_eq!(runs.get(), 1);
    assert_eq!(d.peek(), 4);

    rt.batch(|| s.set(2));
    assert_eq!(runs.get(), 2);
    assert_eq!(d.peek(), 7);
}

#[test]
fn test_diamond_unbatched_write_also_runs_once() {
    let rt = Runtime::new();
    let (s, d) = diamond(&rt);
    let seen = Rc::new(Cell::new(Vec::<i32>::new()));
    let _effect = rt.effect({
        let (d, seen) = (d.clone(), Rc::clone(&seen));
        move || {
            let mut values = seen.take();
            values.push(d.get());
            seen.set(values);
        }
    });
    s.set(3);
    assert_eq!(seen.take(), vec![4, 10]);
}

#[test]
fn test_batch_coalesces_many_writes() {
    let rt = Runtime::new();
    let a = rt.signal(0);
    let b = rt.signal(0);
    let (_effect, runs) = counting_effect(&rt, {
        let (a, b) = (a.clone(), b.clone());
        move || a.get() + b.get()
    });

    rt.batch(|| {
        for i in 1..=10 {
            a.set(i);
            b.set(-i);
        }
        rt.batch(|| a.set(42));
        assert_eq!(runs.get(), 1);
    });
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_same_value_write_is_silent() {
    let rt = Runtime::new();
    let s = rt.signal(5.0_f64);
    let (_effect, runs) = counting_effect(&rt, {
        let s = s.clone();
        move || s.get()
    });
    assert_eq!(runs.get(), 1);

    s.set(5.0);
    assert_eq!(runs.get(), 1);

    s.set(f64::NAN);
    assert_eq!(runs.get(), 2);
    s.set(f64::NAN);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_disposed_effect_never_runs_again() {
    let rt = Runtime::new();
    let x = rt.signal(0);
    let y = rt.signal(0);
    let runs = Rc::new(Cell::new(0));
    let cleanups = Rc::new(Cell::new(0));
    let effect = rt.effect({
        let (x, y) = (x.clone(), y.clone());
        let (runs, cleanups) = (Rc::clone(&runs), Rc::clone(&cleanups));
        move || {
            x.get();
            y.get();
            runs.set(runs.get() + 1);
            let cleanups = Rc::clone(&cleanups);
            cleanup(move || cleanups.set(cleanups.get() + 1))
        }
    });

    effect.dispose();
    x.set(1);
    y.set(1);
    rt.batch(|| x.set(2));
    effect.dispose();

    assert_eq!(runs.get(), 1);
    assert_eq!(cleanups.get(), 1);
}

#[test]
fn test_panicking_effect_leaves_graph_usable() {
    let rt = Runtime::new();
    let s = rt.signal(0);
    let _bomb = rt.effect({
        let s = s.clone();
        move || {
            assert_ne!(s.get(), 13, "unlucky");
        }
    });
    let (_effect, runs) = counting_effect(&rt, {
        let s = s.clone();
        move || s.get()
    });

    let result = catch_unwind(AssertUnwindSafe(|| s.set(13)));
    assert!(result.is_err());
    assert!(!rt.is_batching());

    // The observer slot was restored: a plain read registers nothing.
    s.get();
    s.set(14);
    assert!(runs.get() >= 2);
}

#[test]
fn test_panic_in_batch_drops_pending_writes() {
    let rt = Runtime::new();
    let s = rt.signal(0);
    let (_effect, runs) = counting_effect(&rt, {
        let s = s.clone();
        move || s.get()
    });

    let result = catch_unwind(AssertUnwindSafe(|| {
        rt.batch(|| {
            s.set(1);
            panic!("abort transaction");
        });
    }));
    assert!(result.is_err());
    assert!(!rt.is_batching());
    assert_eq!(runs.get(), 1);

    rt.batch(|| s.set(2));
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_panicking_computed_surfaces_on_read() {
    let rt = Runtime::new();
    let s = rt.signal(1);
    let checked = rt.computed({
        let s = s.clone();
        move || {
            let v = s.get();
            assert!(v > 0, "negative input");
            v
        }
    });
    assert_eq!(checked.get(), 1);

    s.set(-1);
    assert!(catch_unwind(AssertUnwindSafe(|| checked.get())).is_err());

    s.set(2);
    assert_eq!(checked.get(), 2);
}

#[test]
fn test_untrack_inside_effect() {
    let rt = Runtime::new();
    let tracked = rt.signal(0);
    let hidden = rt.signal(0);
    let (_effect, runs) = counting_effect(&rt, {
        let (rt, tracked, hidden) = (rt.clone(), tracked.clone(), hidden.clone());
        move || tracked.get() + rt.untrack(|| hidden.get())
    });
    hidden.set(1);
    assert_eq!(runs.get(), 1);
    tracked.set(1);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_nodes_released_with_handles() {
    let rt = Runtime::new();
    {
        let s = rt.signal(1);
        let _c = rt.computed(move || s.get());
        let _t = rt.tracker();
        assert_eq!(rt.node_count(), 3);
    }
    assert_eq!(rt.node_count(), 0);
}
