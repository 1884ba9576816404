//! Leave type reference data. Administered outside the engine; consumed here
//! to decide whether balance rules and half-day requests apply.

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct LeaveType {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub is_paid: bool,
    #[n(4)]
    pub supports_half_day: bool,
    #[n(5)]
    pub affects_payroll: bool,
    #[n(6)]
    pub is_active: bool,
    #[n(7)]
    pub version: u64,
}

impl LeaveType {
    pub fn new(id: &str, code: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            is_paid: true,
            supports_half_day: true,
            affects_payroll: false,
            is_active: true,
            version: 1,
        }
    }

    pub fn unpaid(mut self) -> Self {
        self.is_paid = false;
        self
    }

    pub fn without_half_day(mut self) -> Self {
        self.supports_half_day = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
