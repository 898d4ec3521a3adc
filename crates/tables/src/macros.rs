/// Trait for accepting arguments which may be owned, or can be cloned.
pub trait OwnOrClone<T> {
    fn own_or_clone(self) -> T;
}

impl<T> OwnOrClone<T> for T {
    fn own_or_clone(self) -> T {
        self
    }
}

impl<'a, T: Clone> OwnOrClone<T> for &'a T {
    fn own_or_clone(self) -> T {
        self.clone()
    }
}

/// Insert a row at its ordered position with respect to the table's
/// order_by columns. Insertion is stable: a row whose key is equal to
/// existing rows lands after them.
macro_rules! ordered_insert {
    ($self:ident, $new:ident,) => {
        $self.0.push($new);
    };
    ($self:ident, $new:ident, $($key:ident)+) => {{
        use superslice::Ext;
        let index = $self
            .0
            .upper_bound_by(|l| ($(&l.$key,)+).cmp(&($(&$new.$key,)+)));
        $self.0.insert(index, $new);
    }};
}

/// Define row & table structures and related implementations.
macro_rules! tables {
    ($(
        table $table:ident ( row $row:ident, order_by [ $($key:ident)* ] ) {
            $(
            $(#[$field_doc:meta])*
            $field:ident: $rust_type:ty,
            )*
        }
    )*) => {
        $(

        #[derive(Debug, Clone)]
        pub struct $row {
            $(
            $(#[$field_doc])*
            pub $field: $rust_type,
            )*
        }

        /// New-type wrapper of a Row vector, kept ordered by the
        /// table's order_by columns.
        #[derive(Default, Debug, Clone)]
        pub struct $table(Vec<$row>);

        impl $table {
            /// New returns an empty Table.
            pub fn new() -> Self { Self(Vec::new()) }

            /// Insert a new Row into the Table, at its ordered position.
            /// Arguments match the positional order of the table's definition.
            pub fn insert_row(&mut self, $( $field: impl crate::OwnOrClone<$rust_type>, )*) {
                let row = $row {
                    $($field: crate::OwnOrClone::own_or_clone($field),)*
                };
                self.insert(row);
            }

            /// Insert an existing Row into the Table, at its ordered position.
            pub fn insert(&mut self, row: $row) {
                ordered_insert!(self, row, $($key)*);
            }

            /// Consume the Table, returning its ordered rows.
            pub fn into_inner(self) -> Vec<$row> {
                self.0
            }

            /// Retain only rows for which |predicate| holds,
            /// preserving order.
            pub fn retain(&mut self, predicate: impl FnMut(&$row) -> bool) {
                self.0.retain(predicate);
            }
        }

        impl std::ops::Deref for $table {
            type Target = [$row];
            fn deref(&self) -> &[$row] { &self.0 }
        }

        impl std::ops::DerefMut for $table {
            fn deref_mut(&mut self) -> &mut [$row] { &mut self.0 }
        }

        impl std::iter::Extend<$row> for $table {
            fn extend<I: IntoIterator<Item = $row>>(&mut self, iter: I) {
                for row in iter {
                    self.insert(row);
                }
            }
        }

        impl std::iter::FromIterator<$row> for $table {
            fn from_iter<I: IntoIterator<Item = $row>>(iter: I) -> Self {
                let mut table = Self::new();
                table.extend(iter);
                table
            }
        }

        )*
    }
}
