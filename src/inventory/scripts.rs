//! The three atomic Lua scripts that implement reserve / release / confirm
//! as single logical operations against the inventory store. Loaded once
//! via `redis::Script` and invoked with `EVALSHA` (the crate transparently
//! falls back to `EVAL` on a cache miss).

use redis::Script;

/// KEYS: [availability, user_counter, reservation]
/// ARGV: [quantity, max_per_user, user_id, booking_id, zone_id, event_id,
///        show_id, unit_price, ttl_seconds]
pub fn reserve_script() -> Script {
    Script::new(
        r#"
local quantity = tonumber(ARGV[1])
local max_per_user = tonumber(ARGV[2])
local user_id = ARGV[3]
local booking_id = ARGV[4]
local zone_id = ARGV[5]
local event_id = ARGV[6]
local show_id = ARGV[7]
local unit_price = ARGV[8]
local ttl_seconds = tonumber(ARGV[9])

if quantity <= 0 then
  return {0, "INVALID_QUANTITY", "quantity must be positive"}
end

local available = redis.call("GET", KEYS[1])
if available == false then
  return {0, "ZONE_NOT_FOUND", "zone availability key does not exist"}
end
available = tonumber(available)

if available < quantity then
  return {0, "INSUFFICIENT_STOCK", "not enough availability in zone"}
end

local user_reserved = tonumber(redis.call("GET", KEYS[2]) or "0")
if max_per_user > 0 and (user_reserved + quantity) > max_per_user then
  return {0, "USER_LIMIT_EXCEEDED", "reservation would exceed per-user limit"}
end

local new_available = redis.call("DECRBY", KEYS[1], quantity)
local new_user_reserved = redis.call("INCRBY", KEYS[2], quantity)
redis.call("EXPIRE", KEYS[2], ttl_seconds + 60)

local now = redis.call("TIME")
local now_secs = tonumber(now[1])
local expires_at = now_secs + ttl_seconds

redis.call("HSET", KEYS[3],
  "booking_id", booking_id,
  "user_id", user_id,
  "zone_id", zone_id,
  "event_id", event_id,
  "show_id", show_id,
  "quantity", quantity,
  "unit_price", unit_price,
  "status", "reserved",
  "created_at", now_secs,
  "expires_at", expires_at
)
redis.call("EXPIRE", KEYS[3], ttl_seconds)

return {1, new_available, new_user_reserved}
"#,
    )
}

/// KEYS: [availability, user_counter, reservation]
/// ARGV: [booking_id, user_id]
pub fn release_script() -> Script {
    Script::new(
        r#"
local booking_id = ARGV[1]
local user_id = ARGV[2]

local exists = redis.call("EXISTS", KEYS[3])
if exists == 0 then
  return {0, "RESERVATION_NOT_FOUND", "reservation hash is absent or expired"}
end

local hash_booking_id = redis.call("HGET", KEYS[3], "booking_id")
if hash_booking_id ~= booking_id then
  return {0, "INVALID_BOOKING_ID", "booking id does not match reservation"}
end

local hash_user_id = redis.call("HGET", KEYS[3], "user_id")
if hash_user_id ~= user_id then
  return {0, "INVALID_USER_ID", "user id does not match reservation"}
end

local status = redis.call("HGET", KEYS[3], "status")
if status ~= "reserved" then
  return {0, "ALREADY_RELEASED", "reservation is not in reserved status"}
end

local quantity = tonumber(redis.call("HGET", KEYS[3], "quantity"))

local new_available = redis.call("INCRBY", KEYS[1], quantity)

local new_user_reserved = tonumber(redis.call("DECRBY", KEYS[2], quantity))
if new_user_reserved <= 0 then
  redis.call("DEL", KEYS[2])
  new_user_reserved = 0
else
  local ttl = redis.call("TTL", KEYS[2])
  if ttl and ttl > 0 then
    redis.call("EXPIRE", KEYS[2], ttl)
  end
end

redis.call("DEL", KEYS[3])

return {1, new_available, new_user_reserved}
"#,
    )
}

/// KEYS: [reservation]
/// ARGV: [booking_id, user_id, payment_id]
pub fn confirm_script() -> Script {
    Script::new(
        r#"
local booking_id = ARGV[1]
local user_id = ARGV[2]
local payment_id = ARGV[3]

local exists = redis.call("EXISTS", KEYS[1])
if exists == 0 then
  return {0, "RESERVATION_NOT_FOUND", "reservation hash is absent or expired"}
end

local hash_booking_id = redis.call("HGET", KEYS[1], "booking_id")
if hash_booking_id ~= booking_id then
  return {0, "RESERVATION_NOT_FOUND", "booking id does not match reservation"}
end

local hash_user_id = redis.call("HGET", KEYS[1], "user_id")
if hash_user_id ~= user_id then
  return {0, "INVALID_USER_ID", "user id does not match reservation"}
end

local status = redis.call("HGET", KEYS[1], "status")
if status == "confirmed" then
  return {0, "ALREADY_CONFIRMED", "reservation is already confirmed"}
end

local now = redis.call("TIME")
local now_secs = tonumber(now[1])

redis.call("HSET", KEYS[1], "status", "confirmed", "payment_id", payment_id, "confirmed_at", now_secs)

return {1, "CONFIRMED", now_secs}
"#,
    )
}
