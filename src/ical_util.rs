use ical::property::Property;

pub fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties.iter().find(|p| p.name == name)
}

pub fn find_property_value(properties: &[Property], name: &str) -> Option<String> {
    find_property(properties, name).and_then(|p| p.value.clone())
}

/// All properties with the given name, in feed order. ATTENDEE in
/// particular may occur any number of times on a single event.
pub fn find_properties<'a>(
    properties: &'a [Property],
    name: &'a str,
) -> impl Iterator<Item = &'a Property> {
    properties.iter().filter(move |p| p.name == name)
}

pub fn find_param<'a>(params: &'a [(String, Vec<String>)], name: &str) -> Option<&'a [String]> {
    params
        .iter()
        .find(|(param_name, _)| param_name == name)
        .map(|(_, values)| values.as_slice())
}

/// A property parameter's first value, which is the only one we ever care
/// about for TZID and PARTSTAT.
pub fn first_param_value<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params
        .as_ref()
        .and_then(|params| find_param(params, name))
        .and_then(|values| values.first())
        .map(String::as_str)
}

/// True for DTSTART/DTEND properties carrying VALUE=DATE, the all-day form.
pub fn is_ical_date(prop: &Property) -> bool {
    first_param_value(prop, "VALUE") == Some("DATE")
}
