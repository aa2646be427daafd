//! Positional parameter lists

use crate::SqlValue;

/// Implemented for types that represent a list of positional parameters
pub trait IntoParams {
    fn to_params(self) -> Vec<SqlValue>;
}

/// Allow use of a vector instead of tuples, for when the number of
/// parameters is unknown at compile time
impl IntoParams for Vec<SqlValue> {
    fn to_params(self) -> Vec<SqlValue> {
        self
    }
}

/// Represents no parameters
impl IntoParams for () {
    fn to_params(self) -> Vec<SqlValue> {
        vec![]
    }
}

/// One implementation per tuple arity. The type parameters double as
/// the binding names when the tuple is taken apart, which is what the
/// `non_snake_case` allowance is for.
macro_rules! params_tuple {
    ($($p:ident),+) => {
        impl<$($p),+> IntoParams for ($($p,)+)
        where
            $($p: Into<SqlValue>,)+
        {
            #[allow(non_snake_case)]
            fn to_params(self) -> Vec<SqlValue> {
                let ($($p,)+) = self;

                vec![$($p.into()),+]
            }
        }
    };
}

params_tuple!(P1);
params_tuple!(P1, P2);
params_tuple!(P1, P2, P3);
params_tuple!(P1, P2, P3, P4);
params_tuple!(P1, P2, P3, P4, P5);
params_tuple!(P1, P2, P3, P4, P5, P6);
params_tuple!(P1, P2, P3, P4, P5, P6, P7);
params_tuple!(P1, P2, P3, P4, P5, P6, P7, P8);
params_tuple!(P1, P2, P3, P4, P5, P6, P7, P8, P9);
params_tuple!(P1, P2, P3, P4, P5, P6, P7, P8, P9, P10);
params_tuple!(P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11);
params_tuple!(P1, P2, P3, P4, P5, P6, P7, P8, P9, P10, P11, P12);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tuples_become_value_lists() {
        let params = (3, "c").to_params();

        assert_eq!(
            params,
            vec![SqlValue::SmallInt(3), SqlValue::Text("c".to_string())]
        );
        assert_eq!(().to_params(), vec![]);
    }

    #[test]
    fn mixed_arities() {
        let params = (1i64, 2.5f64, "x", Option::<i32>::None).to_params();

        assert_eq!(
            params,
            vec![
                SqlValue::SmallInt(1),
                SqlValue::Double(2.5),
                SqlValue::Text("x".to_string()),
                SqlValue::Null,
            ]
        );
    }
}
