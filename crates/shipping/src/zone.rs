use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, PolicyViolation, Rate,
    ShippingMethodId, ShippingZoneId,
};
use bazaar_events::Event;

use crate::calculator::{method_cost, CostType, MethodTerms, ShippingQuote};

pub const AGGREGATE_TYPE: &str = "shipping.zone";

/// A shipping method owned by a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub terms: MethodTerms,
    pub is_active: bool,
}

/// Aggregate root: ShippingZone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingZone {
    id: ShippingZoneId,
    name: String,
    is_active: bool,
    methods: Vec<ShippingMethod>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl ShippingZone {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ShippingZoneId) -> Self {
        Self {
            id,
            name: String::new(),
            is_active: false,
            methods: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn methods(&self) -> &[ShippingMethod] {
        &self.methods
    }

    pub fn method(&self, method_id: ShippingMethodId) -> Option<&ShippingMethod> {
        self.methods.iter().find(|m| m.id == method_id)
    }

    /// Quote one method of this zone.
    pub fn compute_cost(
        &self,
        method_id: ShippingMethodId,
        subtotal: Money,
        weight: Option<Decimal>,
    ) -> DomainResult<ShippingQuote> {
        let active = self.active_methods()?;
        let method = active
            .into_iter()
            .find(|m| m.id == method_id)
            .ok_or_else(|| DomainError::not_found("shipping method", method_id))?;

        self.quote(method, subtotal, weight)
    }

    /// Quotes for every active method, in the zone's method order.
    pub fn available_methods(&self, subtotal: Money, weight: Option<Decimal>) -> DomainResult<Vec<ShippingQuote>> {
        self.active_methods()?
            .into_iter()
            .map(|m| self.quote(m, subtotal, weight))
            .collect()
    }

    fn active_methods(&self) -> DomainResult<Vec<&ShippingMethod>> {
        // Deleted and disabled zones are invisible to checkout.
        if !self.exists() || !self.is_active {
            return Err(DomainError::not_found("shipping zone", self.id));
        }
        let active: Vec<_> = self.methods.iter().filter(|m| m.is_active).collect();
        if active.is_empty() {
            return Err(PolicyViolation::NoActiveMethodsInZone.into());
        }
        Ok(active)
    }

    fn quote(&self, method: &ShippingMethod, subtotal: Money, weight: Option<Decimal>) -> DomainResult<ShippingQuote> {
        Ok(ShippingQuote {
            zone_id: self.id,
            zone_name: self.name.clone(),
            method_id: method.id,
            method_name: method.terms.name.clone(),
            cost: method_cost(&method.terms, subtotal, weight)?,
            estimated_days: method.terms.estimated_days,
        })
    }

    /// Snapshot as plain records (configuration export).
    pub fn to_records(&self) -> Option<(ShippingZoneRecord, Vec<ShippingMethodRecord>)> {
        if !self.exists() {
            return None;
        }
        let zone = ShippingZoneRecord {
            id: self.id,
            name: self.name.clone(),
            is_active: self.is_active,
        };
        let methods = self
            .methods
            .iter()
            .map(|m| ShippingMethodRecord::from_method(self.id, m))
            .collect();
        Some((zone, methods))
    }

    fn ensure_exists(&self) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found("shipping zone", self.id));
        }
        Ok(())
    }

    fn ensure_method(&self, method_id: ShippingMethodId) -> DomainResult<&ShippingMethod> {
        self.method(method_id)
            .ok_or_else(|| DomainError::not_found("shipping method", method_id))
    }
}

impl AggregateRoot for ShippingZone {
    type Id = ShippingZoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingZoneRecord {
    pub id: ShippingZoneId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethodRecord {
    pub id: ShippingMethodId,
    pub zone_id: ShippingZoneId,
    pub name: String,
    pub cost_type: CostType,
    pub base_cost: Money,
    #[serde(default)]
    pub cost_per_kg: Option<Money>,
    #[serde(default)]
    pub cost_percentage: Option<Rate>,
    #[serde(default)]
    pub max_cost: Option<Money>,
    #[serde(default)]
    pub free_shipping_threshold: Option<Money>,
    #[serde(default)]
    pub estimated_days: Option<u32>,
    pub is_active: bool,
}

impl ShippingMethodRecord {
    fn from_method(zone_id: ShippingZoneId, m: &ShippingMethod) -> Self {
        Self {
            id: m.id,
            zone_id,
            name: m.terms.name.clone(),
            cost_type: m.terms.cost_type,
            base_cost: m.terms.base_cost,
            cost_per_kg: m.terms.cost_per_kg,
            cost_percentage: m.terms.cost_percentage,
            max_cost: m.terms.max_cost,
            free_shipping_threshold: m.terms.free_shipping_threshold,
            estimated_days: m.terms.estimated_days,
            is_active: m.is_active,
        }
    }

    pub fn terms(&self) -> MethodTerms {
        MethodTerms {
            name: self.name.clone(),
            cost_type: self.cost_type,
            base_cost: self.base_cost,
            cost_per_kg: self.cost_per_kg,
            cost_percentage: self.cost_percentage,
            max_cost: self.max_cost,
            free_shipping_threshold: self.free_shipping_threshold,
            estimated_days: self.estimated_days,
        }
    }
}

/// Command: CreateShippingZone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShippingZone {
    pub zone_id: ShippingZoneId,
    pub name: String,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameShippingZone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameShippingZone {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShippingZoneActive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShippingZoneActive {
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddShippingMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddShippingMethod {
    pub method_id: ShippingMethodId,
    pub terms: MethodTerms,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateShippingMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShippingMethod {
    pub method_id: ShippingMethodId,
    pub terms: MethodTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetShippingMethodActive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetShippingMethodActive {
    pub method_id: ShippingMethodId,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveShippingMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveShippingMethod {
    pub method_id: ShippingMethodId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteShippingZone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteShippingZone {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShippingZoneCommand {
    CreateShippingZone(CreateShippingZone),
    RenameShippingZone(RenameShippingZone),
    SetShippingZoneActive(SetShippingZoneActive),
    AddShippingMethod(AddShippingMethod),
    UpdateShippingMethod(UpdateShippingMethod),
    SetShippingMethodActive(SetShippingMethodActive),
    RemoveShippingMethod(RemoveShippingMethod),
    DeleteShippingZone(DeleteShippingZone),
}

/// Event: ShippingZoneCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZoneCreated {
    pub zone_id: ShippingZoneId,
    pub name: String,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingZoneRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZoneRenamed {
    pub zone_id: ShippingZoneId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingZoneStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZoneStatusChanged {
    pub zone_id: ShippingZoneId,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingMethodAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethodAdded {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    pub terms: MethodTerms,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingMethodUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethodUpdated {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    pub terms: MethodTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingMethodStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethodStatusChanged {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    pub is_active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingMethodRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethodRemoved {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShippingZoneDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZoneDeleted {
    pub zone_id: ShippingZoneId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShippingZoneEvent {
    ShippingZoneCreated(ShippingZoneCreated),
    ShippingZoneRenamed(ShippingZoneRenamed),
    ShippingZoneStatusChanged(ShippingZoneStatusChanged),
    ShippingMethodAdded(ShippingMethodAdded),
    ShippingMethodUpdated(ShippingMethodUpdated),
    ShippingMethodStatusChanged(ShippingMethodStatusChanged),
    ShippingMethodRemoved(ShippingMethodRemoved),
    ShippingZoneDeleted(ShippingZoneDeleted),
}

impl Event for ShippingZoneEvent {
    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn event_type(&self) -> &'static str {
        match self {
            ShippingZoneEvent::ShippingZoneCreated(_) => "shipping.zone.created",
            ShippingZoneEvent::ShippingZoneRenamed(_) => "shipping.zone.renamed",
            ShippingZoneEvent::ShippingZoneStatusChanged(_) => "shipping.zone.status_changed",
            ShippingZoneEvent::ShippingMethodAdded(_) => "shipping.zone.method_added",
            ShippingZoneEvent::ShippingMethodUpdated(_) => "shipping.zone.method_updated",
            ShippingZoneEvent::ShippingMethodStatusChanged(_) => {
                "shipping.zone.method_status_changed"
            }
            ShippingZoneEvent::ShippingMethodRemoved(_) => "shipping.zone.method_removed",
            ShippingZoneEvent::ShippingZoneDeleted(_) => "shipping.zone.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShippingZoneEvent::ShippingZoneCreated(e) => e.occurred_at,
            ShippingZoneEvent::ShippingZoneRenamed(e) => e.occurred_at,
            ShippingZoneEvent::ShippingZoneStatusChanged(e) => e.occurred_at,
            ShippingZoneEvent::ShippingMethodAdded(e) => e.occurred_at,
            ShippingZoneEvent::ShippingMethodUpdated(e) => e.occurred_at,
            ShippingZoneEvent::ShippingMethodStatusChanged(e) => e.occurred_at,
            ShippingZoneEvent::ShippingMethodRemoved(e) => e.occurred_at,
            ShippingZoneEvent::ShippingZoneDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ShippingZone {
    type Command = ShippingZoneCommand;
    type Event = ShippingZoneEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShippingZoneEvent::ShippingZoneCreated(e) => {
                self.id = e.zone_id;
                self.name = e.name.clone();
                self.is_active = e.is_active;
                self.methods.clear();
                self.created = true;
            }
            ShippingZoneEvent::ShippingZoneRenamed(e) => {
                self.name = e.name.clone();
            }
            ShippingZoneEvent::ShippingZoneStatusChanged(e) => {
                self.is_active = e.is_active;
            }
            ShippingZoneEvent::ShippingMethodAdded(e) => {
                self.methods.push(ShippingMethod {
                    id: e.method_id,
                    terms: e.terms.clone(),
                    is_active: e.is_active,
                });
            }
            ShippingZoneEvent::ShippingMethodUpdated(e) => {
                if let Some(m) = self.methods.iter_mut().find(|m| m.id == e.method_id) {
                    m.terms = e.terms.clone();
                }
            }
            ShippingZoneEvent::ShippingMethodStatusChanged(e) => {
                if let Some(m) = self.methods.iter_mut().find(|m| m.id == e.method_id) {
                    m.is_active = e.is_active;
                }
            }
            ShippingZoneEvent::ShippingMethodRemoved(e) => {
                self.methods.retain(|m| m.id != e.method_id);
            }
            ShippingZoneEvent::ShippingZoneDeleted(_) => {
                self.deleted = true;
                self.is_active = false;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShippingZoneCommand::CreateShippingZone(cmd) => self.handle_create(cmd),
            ShippingZoneCommand::RenameShippingZone(cmd) => self.handle_rename(cmd),
            ShippingZoneCommand::SetShippingZoneActive(cmd) => self.handle_set_active(cmd),
            ShippingZoneCommand::AddShippingMethod(cmd) => self.handle_add_method(cmd),
            ShippingZoneCommand::UpdateShippingMethod(cmd) => self.handle_update_method(cmd),
            ShippingZoneCommand::SetShippingMethodActive(cmd) => self.handle_set_method_active(cmd),
            ShippingZoneCommand::RemoveShippingMethod(cmd) => self.handle_remove_method(cmd),
            ShippingZoneCommand::DeleteShippingZone(cmd) => self.handle_delete(cmd),
        }
    }
}

fn validate_zone_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("shipping zone name must not be empty"));
    }
    Ok(name.to_string())
}

impl ShippingZone {
    fn handle_create(&self, cmd: &CreateShippingZone) -> DomainResult<Vec<ShippingZoneEvent>> {
        if self.created {
            return Err(PolicyViolation::AlreadyExists(format!("shipping zone '{}'", self.id)).into());
        }
        let name = validate_zone_name(&cmd.name)?;

        Ok(vec![ShippingZoneEvent::ShippingZoneCreated(ShippingZoneCreated {
            zone_id: cmd.zone_id,
            name,
            is_active: cmd.is_active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameShippingZone) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        let name = validate_zone_name(&cmd.name)?;
        if name == self.name {
            return Ok(vec![]);
        }

        Ok(vec![ShippingZoneEvent::ShippingZoneRenamed(ShippingZoneRenamed {
            zone_id: self.id,
            name,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetShippingZoneActive) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        if cmd.is_active == self.is_active {
            return Ok(vec![]);
        }

        Ok(vec![ShippingZoneEvent::ShippingZoneStatusChanged(ShippingZoneStatusChanged {
            zone_id: self.id,
            is_active: cmd.is_active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_method(&self, cmd: &AddShippingMethod) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        cmd.terms.validate()?;
        if self.method(cmd.method_id).is_some() {
            return Err(
                PolicyViolation::AlreadyExists(format!("shipping method '{}'", cmd.method_id)).into(),
            );
        }

        Ok(vec![ShippingZoneEvent::ShippingMethodAdded(ShippingMethodAdded {
            zone_id: self.id,
            method_id: cmd.method_id,
            terms: cmd.terms.clone(),
            is_active: cmd.is_active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_method(&self, cmd: &UpdateShippingMethod) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        self.ensure_method(cmd.method_id)?;
        cmd.terms.validate()?;

        Ok(vec![ShippingZoneEvent::ShippingMethodUpdated(ShippingMethodUpdated {
            zone_id: self.id,
            method_id: cmd.method_id,
            terms: cmd.terms.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_method_active(&self, cmd: &SetShippingMethodActive) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        let method = self.ensure_method(cmd.method_id)?;
        if method.is_active == cmd.is_active {
            return Ok(vec![]);
        }

        Ok(vec![ShippingZoneEvent::ShippingMethodStatusChanged(ShippingMethodStatusChanged {
            zone_id: self.id,
            method_id: cmd.method_id,
            is_active: cmd.is_active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_method(&self, cmd: &RemoveShippingMethod) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        self.ensure_method(cmd.method_id)?;

        Ok(vec![ShippingZoneEvent::ShippingMethodRemoved(ShippingMethodRemoved {
            zone_id: self.id,
            method_id: cmd.method_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteShippingZone) -> DomainResult<Vec<ShippingZoneEvent>> {
        self.ensure_exists()?;
        if !self.methods.is_empty() {
            return Err(PolicyViolation::ZoneHasMethods.into());
        }

        Ok(vec![ShippingZoneEvent::ShippingZoneDeleted(ShippingZoneDeleted {
            zone_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
