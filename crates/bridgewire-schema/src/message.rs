use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed record that travels as a bridge payload.
///
/// `TYPE_NAME` is the `package/Type` name the bridge knows the record by;
/// it is what goes into the `type` field of advertise and subscribe.
///
/// ```
/// use bridgewire_schema::BridgeMessage;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Chatter {
///     data: String,
/// }
///
/// impl BridgeMessage for Chatter {
///     const TYPE_NAME: &'static str = "std_msgs/String";
/// }
///
/// assert_eq!(Chatter::TYPE_NAME, "std_msgs/String");
/// ```
pub trait BridgeMessage: Serialize + DeserializeOwned {
    /// Bridge type name, `package/Type`.
    const TYPE_NAME: &'static str;

    /// Type name of this record.
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }
}
