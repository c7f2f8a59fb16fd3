//! Internal testing utilities for the narchi crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Table-driven tests.
///
/// Define a `Case` struct holding the inputs and expected output of one
/// test, build a collection of cases and call `test_each` with the test
/// body. Every case is run, even if earlier ones fail, and the failing cases
/// are reported together.
///
/// ```
/// use narchi_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     size: i64,
///     stride: i64,
///     expected: i64,
/// }
///
/// let cases = [
///     Case { size: 10, stride: 2, expected: 5 },
///     Case { size: 11, stride: 2, expected: 6 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!((case.size + case.stride - 1) / case.stride, case.expected);
/// });
/// ```
///
/// Cases and anything captured by the test function must be
/// [unwind safe](std::panic::UnwindSafe), since panics are caught to collect
/// failures. Wrap values which are not in
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    type Case;

    /// Call `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Call `test` with each case by value.
    ///
    /// The debug representation of each case is captured before the test
    /// runs, so it can be reported if the test fails.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

/// Panic if any case failed, listing the failures.
fn report_failures<T: Debug>(total: usize, failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} of {} test cases failed: {:#?}",
        failures.len(),
        total,
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let mut total = 0;
        let failures: Vec<I::Item> = self
            .into_iter()
            .inspect(|_| total += 1)
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(total, &failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + UnwindSafe,
    {
        let mut total = 0;
        let mut failures = Vec::new();
        for case in self {
            total += 1;
            let desc = format!("{:?}", case);
            let test = &test;
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push(desc);
            }
        }
        report_failures(total, &failures);
    }
}
