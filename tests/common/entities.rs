use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_name: String,
    pub amount: i64,
}

impl Order {
    /// An order placed by `user`.
    pub fn placed_by(user: &User, product_name: impl Into<String>, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            product_name: product_name.into(),
            amount,
        }
    }
}
